//! Attribute and context values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum_macros::{Display, EnumDiscriminants};
use utoipa::ToSchema;

use crate::error::PolicyError;

use super::EntityUid;

/// A typed value attached to entities, carried in request context, or
/// produced by condition evaluation.
///
/// The variant set is closed; there is no implicit coercion between
/// variants. Equality is exact per variant, with sets compared as sets
/// (order and duplicates are irrelevant).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, EnumDiscriminants)]
#[strum_discriminants(name(ValueKind), derive(Display, Hash))]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Bool(bool),
    Long(i64),
    String(String),
    #[schema(no_recursion)]
    Set(Vec<Value>),
    #[schema(no_recursion)]
    Record(BTreeMap<String, Value>),
    Entity(EntityUid),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        self.into()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&[Value]> {
        match self {
            Value::Set(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityUid> {
        match self {
            Value::Entity(uid) => Some(uid),
            _ => None,
        }
    }

    /// Build a value from a JSON fragment.
    ///
    /// Numbers must be integral, and `null` is rejected. A single-key
    /// object `{"__entity": {"type": ..., "id": ...}}` denotes an entity
    /// reference; any other object becomes a record.
    pub fn from_json(json: &JsonValue) -> Result<Self, PolicyError> {
        match json {
            JsonValue::Null => Err(PolicyError::ParseError(
                "null values are not supported".to_string(),
            )),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => n.as_i64().map(Value::Long).ok_or_else(|| {
                PolicyError::ParseError(format!("number {n} is not a valid long"))
            }),
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            JsonValue::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Set),
            JsonValue::Object(map) => {
                if map.len() == 1 {
                    if let Some(entity) = map.get("__entity") {
                        return Self::entity_from_json(entity);
                    }
                }
                let mut fields = BTreeMap::new();
                for (key, val) in map {
                    fields.insert(key.clone(), Value::from_json(val)?);
                }
                Ok(Value::Record(fields))
            }
        }
    }

    fn entity_from_json(json: &JsonValue) -> Result<Self, PolicyError> {
        let type_name = json
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PolicyError::InvalidEntityUid("__entity reference lacks a `type`".to_string())
            })?;
        let id = json.get("id").and_then(JsonValue::as_str).ok_or_else(|| {
            PolicyError::InvalidEntityUid("__entity reference lacks an `id`".to_string())
        })?;
        Ok(Value::Entity(EntityUid::new(type_name, id)?))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
            }
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<EntityUid> for Value {
    fn from(uid: EntityUid) -> Self {
        Value::Entity(uid)
    }
}
