//! Policy and template storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::ast::{Policy, SlotId, Template};
use crate::entities::EntityStore;
use crate::error::PolicyError;
use crate::evaluator;
use crate::loader;
use crate::types::{EntityUid, PrincipalPolicies};

/// Where a stored policy came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOrigin {
    /// Added directly, as source text or a parsed policy.
    Static,
    /// Materialized from a template by slot substitution.
    TemplateLinked {
        template_id: String,
        values: BTreeMap<SlotId, EntityUid>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredPolicy {
    policy: Policy,
    origin: PolicyOrigin,
}

/// An insertion-ordered collection of concrete policies and the
/// templates they can be linked from.
///
/// Policy ids and template ids are each unique within their own
/// namespace. The set is plain data: callers must not mutate it while a
/// decision is being computed against it; [`PolicySet::clone_shared`]
/// and [`PolicySet::clone_deep`] exist so a writer can work on a copy
/// while readers keep evaluating against the original.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<(String, Arc<StoredPolicy>)>,
    templates: Vec<(String, Arc<Template>)>,
    next_auto_id: usize,
}

impl PolicySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a policy document and collect every policy in it.
    ///
    /// Ids are read from `@id(..)` annotations where present, otherwise
    /// auto-assigned as `policy0`, `policy1`, ...
    pub fn from_str(text: &str) -> Result<Self, PolicyError> {
        let mut set = PolicySet::new();
        set.add_policies_from_str(text)?;
        Ok(set)
    }

    fn has_policy(&self, id: &str) -> bool {
        self.policies.iter().any(|(existing, _)| existing == id)
    }

    fn has_template(&self, id: &str) -> bool {
        self.templates.iter().any(|(existing, _)| existing == id)
    }

    fn insert_policy(
        &mut self,
        id: String,
        policy: Policy,
        origin: PolicyOrigin,
    ) -> Result<(), PolicyError> {
        if self.has_policy(&id) {
            return Err(PolicyError::DuplicateId(id));
        }
        self.policies
            .push((id, Arc::new(StoredPolicy { policy, origin })));
        Ok(())
    }

    /// Add one parsed policy under `id`.
    ///
    /// A policy whose scope still names slots belongs in a template and
    /// is rejected.
    pub fn add_policy(&mut self, id: impl Into<String>, policy: Policy) -> Result<(), PolicyError> {
        let id = id.into();
        if self.has_policy(&id) {
            return Err(PolicyError::DuplicateId(id));
        }
        if policy.has_slots() {
            return Err(PolicyError::ParseError(
                "policy scope contains slots; add it as a template".to_string(),
            ));
        }
        self.insert_policy(id, policy, PolicyOrigin::Static)
    }

    /// Parse one policy from source text and add it under `id`.
    pub fn add_policy_str(&mut self, id: impl Into<String>, text: &str) -> Result<(), PolicyError> {
        let id = id.into();
        if self.has_policy(&id) {
            return Err(PolicyError::DuplicateId(id));
        }
        let policy = loader::compile_policy(text)?;
        self.insert_policy(id, policy, PolicyOrigin::Static)
    }

    /// Parse a document of policies and add them all, or none.
    ///
    /// The returned ids are in document order. If any policy fails to
    /// parse, or any id (annotated or auto-assigned) collides, the set is
    /// left untouched.
    pub fn add_policies_from_str(&mut self, text: &str) -> Result<Vec<String>, PolicyError> {
        let parsed = loader::compile_policy_set(text)?;

        let mut staged: Vec<(String, Policy)> = Vec::new();
        let mut auto_id = self.next_auto_id;
        for policy in parsed {
            let id = match policy.id_annotation() {
                Some(id) => id.to_string(),
                None => {
                    let mut candidate = format!("policy{auto_id}");
                    auto_id += 1;
                    while self.has_policy(&candidate)
                        || staged.iter().any(|(staged_id, _)| *staged_id == candidate)
                    {
                        candidate = format!("policy{auto_id}");
                        auto_id += 1;
                    }
                    candidate
                }
            };
            if self.has_policy(&id) || staged.iter().any(|(staged_id, _)| *staged_id == id) {
                return Err(PolicyError::DuplicateId(id));
            }
            staged.push((id, policy));
        }

        let ids: Vec<String> = staged.iter().map(|(id, _)| id.clone()).collect();
        for (id, policy) in staged {
            self.policies.push((
                id,
                Arc::new(StoredPolicy {
                    policy,
                    origin: PolicyOrigin::Static,
                }),
            ));
        }
        self.next_auto_id = auto_id;
        Ok(ids)
    }

    /// The canonical text of one policy, or `None` when the id is
    /// unknown.
    pub fn get_policy(&self, id: &str) -> Option<String> {
        self.policy(id).map(|policy| policy.to_string())
    }

    /// The parsed form of one policy.
    pub fn policy(&self, id: &str) -> Option<&Policy> {
        self.policies
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, stored)| &stored.policy)
    }

    /// How a stored policy came to be in the set.
    pub fn policy_origin(&self, id: &str) -> Option<&PolicyOrigin> {
        self.policies
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, stored)| &stored.origin)
    }

    /// Add a template, keyed by the template's own id.
    pub fn add_template(&mut self, template: Template) -> Result<(), PolicyError> {
        if self.has_template(template.id()) {
            return Err(PolicyError::DuplicateId(template.id().to_string()));
        }
        self.templates
            .push((template.id().to_string(), Arc::new(template)));
        Ok(())
    }

    /// One stored template.
    pub fn template(&self, id: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, template)| template.as_ref())
    }

    /// The canonical text of one template body.
    pub fn get_template(&self, id: &str) -> Option<String> {
        self.template(id).map(|template| template.to_string())
    }

    /// Materialize a template into a concrete policy stored under
    /// `policy_id`.
    ///
    /// `slot_values` maps slot names (`principal` / `resource`, with or
    /// without the leading `?`) to entity UID strings. Every slot the
    /// template references must be supplied, every supplied name must be
    /// a slot the template uses, and every value must parse as a UID.
    pub fn add_template_linked_policy(
        &mut self,
        policy_id: impl Into<String>,
        template_id: &str,
        slot_values: &BTreeMap<String, String>,
    ) -> Result<(), PolicyError> {
        let policy_id = policy_id.into();
        let template = self
            .template(template_id)
            .ok_or_else(|| PolicyError::TemplateNotFound(template_id.to_string()))?
            .clone();

        let mut values: BTreeMap<SlotId, EntityUid> = BTreeMap::new();
        for (name, raw) in slot_values {
            let slot = match name.strip_prefix('?').unwrap_or(name) {
                "principal" => SlotId::Principal,
                "resource" => SlotId::Resource,
                other => {
                    return Err(PolicyError::UnknownSlot(format!("?{other}")));
                }
            };
            let uid: EntityUid = raw.parse()?;
            values.insert(slot, uid);
        }

        let policy = template.link(&values)?;
        self.insert_policy(
            policy_id,
            policy,
            PolicyOrigin::TemplateLinked {
                template_id: template_id.to_string(),
                values,
            },
        )
    }

    /// Concrete policy count; templates are not counted.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Iterate over `(id, policy)` pairs in insertion order, which is
    /// also evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Policy)> {
        self.policies
            .iter()
            .map(|(id, stored)| (id.as_str(), &stored.policy))
    }

    /// Sorted policy ids.
    pub fn policy_ids(&self) -> Vec<String> {
        self.policies.iter().map(|(id, _)| id.clone()).sorted().collect()
    }

    /// Sorted template ids.
    pub fn template_ids(&self) -> Vec<String> {
        self.templates.iter().map(|(id, _)| id.clone()).sorted().collect()
    }

    /// A new set sharing the stored policy payloads with this one.
    ///
    /// Mutating either set's membership never affects the other; the
    /// immutable payloads remain shared.
    pub fn clone_shared(&self) -> Self {
        PolicySet {
            policies: self.policies.clone(),
            templates: self.templates.clone(),
            next_auto_id: self.next_auto_id,
        }
    }

    /// A new set with fully duplicated payloads; no structural sharing
    /// remains.
    pub fn clone_deep(&self) -> Self {
        PolicySet {
            policies: self
                .policies
                .iter()
                .map(|(id, stored)| (id.clone(), Arc::new(stored.as_ref().clone())))
                .collect(),
            templates: self
                .templates
                .iter()
                .map(|(id, template)| (id.clone(), Arc::new(template.as_ref().clone())))
                .collect(),
            next_auto_id: self.next_auto_id,
        }
    }

    /// The policies whose principal scope covers `principal`, resolving
    /// `in` constraints through the entity graph when one is given.
    pub fn policies_for_principal(
        &self,
        principal: &EntityUid,
        entities: Option<&EntityStore>,
    ) -> PrincipalPolicies {
        let ancestors = entities
            .map(|store| store.ancestors(principal))
            .unwrap_or_default();

        let matching = self
            .policies
            .iter()
            .filter(|(_, stored)| {
                evaluator::principal_covers(&stored.policy.principal, principal, &ancestors)
                    .unwrap_or(false)
            })
            .map(|(id, stored)| (id.clone(), stored.policy.clone()))
            .collect();

        PrincipalPolicies::new(principal.clone(), matching)
    }
}
