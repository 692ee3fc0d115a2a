//! Request context attributes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PolicyError;

use super::Value;

/// Typed wrapper for the context attributes of a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct RequestContext(BTreeMap<String, Value>);

impl RequestContext {
    /// Create an empty request context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object, e.g. parsed caller metadata.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, PolicyError> {
        let serde_json::Value::Object(map) = json else {
            return Err(PolicyError::ParseError(
                "context must be a JSON object".to_string(),
            ));
        };
        let mut attrs = BTreeMap::new();
        for (key, value) in map {
            attrs.insert(key.clone(), Value::from_json(value)?);
        }
        Ok(RequestContext(attrs))
    }

    /// Add one context attribute and return the updated context.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert one context attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up one context attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true when there are no context attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of context attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over context attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// View the whole context as a record value for evaluation.
    pub(crate) fn to_record(&self) -> Value {
        Value::Record(self.0.clone())
    }
}

impl From<BTreeMap<String, Value>> for RequestContext {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self(value)
    }
}

impl From<RequestContext> for BTreeMap<String, Value> {
    fn from(value: RequestContext) -> Self {
        value.0
    }
}

impl<'a> IntoIterator for &'a RequestContext {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_len() {
        let mut context = RequestContext::new();
        assert!(context.is_empty());

        context.insert("authenticated", true);
        context.insert("level", 3i64);

        assert_eq!(context.len(), 2);
        assert_eq!(context.get("level"), Some(&Value::Long(3)));
    }

    #[test]
    fn test_from_json() {
        let context =
            RequestContext::from_json(&json!({"ip": "192.0.2.1", "mfa": true})).unwrap();
        assert_eq!(context.get("mfa"), Some(&Value::Bool(true)));
        assert_eq!(context.get("ip"), Some(&Value::from("192.0.2.1")));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(RequestContext::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_to_record() {
        let context = RequestContext::new().with_attr("a", 1i64);
        let Value::Record(fields) = context.to_record() else {
            panic!("expected a record");
        };
        assert_eq!(fields["a"], Value::Long(1));
    }
}
