//! Entity storage and hierarchy resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use once_cell::sync::Lazy;

use crate::error::PolicyError;
use crate::types::{EntityUid, Value};

static EMPTY_ATTRS: Lazy<BTreeMap<String, Value>> = Lazy::new(BTreeMap::new);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct EntityRecord {
    attrs: BTreeMap<String, Value>,
    parents: BTreeSet<EntityUid>,
}

/// All entities known to one authorization context.
///
/// Parent references may name entities that were never added; ancestor
/// queries treat such nodes as having no attributes and no further
/// parents. The store is plain data: callers must not mutate it while a
/// decision is being computed against it (exclusive writer, many
/// concurrent readers).
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: HashMap<EntityUid, EntityRecord>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity's attributes and parent set.
    ///
    /// Replacing is not an error; the previous attributes and parents are
    /// dropped.
    pub fn add_entity(
        &mut self,
        uid: EntityUid,
        attrs: impl IntoIterator<Item = (String, Value)>,
        parents: impl IntoIterator<Item = EntityUid>,
    ) {
        self.entities.insert(
            uid,
            EntityRecord {
                attrs: attrs.into_iter().collect(),
                parents: parents.into_iter().collect(),
            },
        );
    }

    /// Insert or replace an entity from UID strings and a JSON attribute
    /// object.
    pub fn add_entity_from_json(
        &mut self,
        uid: &str,
        attrs: &serde_json::Value,
        parents: &[&str],
    ) -> Result<(), PolicyError> {
        let uid: EntityUid = uid.parse()?;
        let serde_json::Value::Object(map) = attrs else {
            return Err(PolicyError::ParseError(
                "entity attributes must be a JSON object".to_string(),
            ));
        };
        let mut attr_map = BTreeMap::new();
        for (key, value) in map {
            attr_map.insert(key.clone(), Value::from_json(value)?);
        }
        let parent_uids = parents
            .iter()
            .map(|p| p.parse())
            .collect::<Result<BTreeSet<EntityUid>, _>>()?;
        self.entities.insert(
            uid,
            EntityRecord {
                attrs: attr_map,
                parents: parent_uids,
            },
        );
        Ok(())
    }

    /// The transitive closure over parent edges, excluding `uid` itself.
    ///
    /// A visited set guards the traversal, so a cycle in the graph cannot
    /// cause non-termination.
    pub fn ancestors(&self, uid: &EntityUid) -> BTreeSet<EntityUid> {
        let mut seen: BTreeSet<EntityUid> = BTreeSet::new();
        let mut queue: VecDeque<&EntityUid> = self
            .entities
            .get(uid)
            .map(|record| record.parents.iter().collect())
            .unwrap_or_default();

        while let Some(parent) = queue.pop_front() {
            if parent == uid || !seen.insert(parent.clone()) {
                continue;
            }
            if let Some(record) = self.entities.get(parent) {
                queue.extend(record.parents.iter());
            }
        }
        seen
    }

    /// Stored attributes, or an empty mapping for unknown entities.
    pub fn attributes(&self, uid: &EntityUid) -> &BTreeMap<String, Value> {
        self.entities
            .get(uid)
            .map_or(&EMPTY_ATTRS, |record| &record.attrs)
    }

    /// One stored attribute, or `None` when the entity or attribute is
    /// unknown.
    pub fn attribute(&self, uid: &EntityUid, name: &str) -> Option<&Value> {
        self.entities.get(uid).and_then(|record| record.attrs.get(name))
    }

    /// Direct parents, or `None` for unknown entities.
    pub fn parents(&self, uid: &EntityUid) -> Option<&BTreeSet<EntityUid>> {
        self.entities.get(uid).map(|record| &record.parents)
    }

    /// Whether an entity has been added.
    pub fn contains(&self, uid: &EntityUid) -> bool {
        self.entities.contains_key(uid)
    }

    /// Drop all entities.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// UIDs that sit on a parent cycle, sorted.
    ///
    /// Ancestor queries already terminate on cyclic graphs; this surfaces
    /// the cycle as a validation concern instead of silently absorbing it.
    pub fn detect_cycles(&self) -> Vec<EntityUid> {
        self.entities
            .keys()
            .filter(|uid| self.reachable_from_parents(uid, uid))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn reachable_from_parents(&self, start: &EntityUid, target: &EntityUid) -> bool {
        let mut seen: BTreeSet<&EntityUid> = BTreeSet::new();
        let mut queue: VecDeque<&EntityUid> = self
            .entities
            .get(start)
            .map(|record| record.parents.iter().collect())
            .unwrap_or_default();

        while let Some(parent) = queue.pop_front() {
            if parent == target {
                return true;
            }
            if !seen.insert(parent) {
                continue;
            }
            if let Some(record) = self.entities.get(parent) {
                queue.extend(record.parents.iter());
            }
        }
        false
    }
}
