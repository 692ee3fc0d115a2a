//! Authorization request type.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::schema::Schema;

use super::{EntityUid, RequestContext};

/// A request to authorize `principal` performing `action` on `resource`.
///
/// The three entity references are validated at construction; a request
/// is immutable once built. An attached [`Schema`] makes the authorizer
/// validate the request before any policy is evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    principal: EntityUid,
    action: EntityUid,
    resource: EntityUid,
    #[serde(default)]
    context: RequestContext,
    #[serde(skip)]
    schema: Option<Schema>,
}

impl Request {
    /// Build a request from canonical UID strings, e.g.
    /// `Request::new("User::\"alice\"", "Action::\"view\"", "Document::\"report\"")`.
    pub fn new(principal: &str, action: &str, resource: &str) -> Result<Self, PolicyError> {
        Ok(Request {
            principal: principal.parse()?,
            action: action.parse()?,
            resource: resource.parse()?,
            context: RequestContext::new(),
            schema: None,
        })
    }

    /// Build a request from already-validated UIDs.
    pub fn from_uids(principal: EntityUid, action: EntityUid, resource: EntityUid) -> Self {
        Request {
            principal,
            action,
            resource,
            context: RequestContext::new(),
            schema: None,
        }
    }

    /// Attach context attributes.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Attach a schema; the request will be validated against it before
    /// evaluation.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn action(&self) -> &EntityUid {
        &self.action
    }

    pub fn resource(&self) -> &EntityUid {
        &self.resource
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Request(principal={}, action={}, resource={})",
            self.principal, self.action, self.resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_new_validates_uids() {
        let request = Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Doc::"r""#);
        assert!(request.is_ok());

        let bad = Request::new("alice", r#"Action::"view""#, r#"Doc::"r""#);
        assert!(matches!(bad, Err(PolicyError::InvalidEntityUid(_))));
    }

    #[test]
    fn test_with_context() {
        let request = Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Doc::"r""#)
            .unwrap()
            .with_context(RequestContext::new().with_attr("mfa", true));
        assert_eq!(request.context().get("mfa"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_display() {
        let request =
            Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Doc::"r""#).unwrap();
        assert_eq!(
            request.to_string(),
            r#"Request(principal=User::"alice", action=Action::"view", resource=Doc::"r")"#
        );
    }

    #[test]
    fn test_serialization_skips_schema() {
        let request =
            Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Doc::"r""#).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("schema").is_none());
        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back.principal(), request.principal());
    }
}
