//! Typed description of entity types and actions, used for optional
//! validation of requests and policy sets.
//!
//! Schemas are described as JSON, namespaced at the top level (use the
//! empty string for the root namespace):
//!
//! ```json
//! {
//!     "": {
//!         "entityTypes": {
//!             "User": { "memberOfTypes": ["Group"] },
//!             "Group": {},
//!             "Document": {
//!                 "shape": {
//!                     "type": "Record",
//!                     "attributes": { "owner": { "type": "Entity", "name": "User" } }
//!                 }
//!             }
//!         },
//!         "actions": {
//!             "view": {
//!                 "appliesTo": {
//!                     "principalTypes": ["User"],
//!                     "resourceTypes": ["Document"],
//!                     "context": {
//!                         "type": "Record",
//!                         "attributes": { "mfa": { "type": "Boolean" } }
//!                     }
//!                 }
//!             }
//!         }
//!     }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;

use crate::ast::{ActionConstraint, PrincipalConstraint, ResourceConstraint, ScopeEntity};
use crate::error::PolicyError;
use crate::store::PolicySet;
use crate::types::{EntityUid, Request, Value};

#[derive(Debug, Deserialize)]
struct NamespaceDecl {
    #[serde(default, rename = "entityTypes")]
    entity_types: BTreeMap<String, EntityTypeDecl>,
    #[serde(default)]
    actions: BTreeMap<String, ActionDecl>,
}

#[derive(Debug, Default, Deserialize)]
struct EntityTypeDecl {
    #[serde(default, rename = "memberOfTypes")]
    member_of_types: Vec<String>,
    #[serde(default)]
    shape: Option<TypeDecl>,
}

#[derive(Debug, Deserialize)]
struct ActionDecl {
    #[serde(default, rename = "appliesTo")]
    applies_to: Option<AppliesToDecl>,
}

#[derive(Debug, Deserialize)]
struct AppliesToDecl {
    #[serde(default, rename = "principalTypes")]
    principal_types: Vec<String>,
    #[serde(default, rename = "resourceTypes")]
    resource_types: Vec<String>,
    #[serde(default)]
    context: Option<TypeDecl>,
}

#[derive(Debug, Deserialize)]
struct TypeDecl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    element: Option<Box<TypeDecl>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, AttrDecl>,
}

#[derive(Debug, Deserialize)]
struct AttrDecl {
    #[serde(flatten)]
    decl: TypeDecl,
    #[serde(default = "default_true")]
    required: bool,
}

fn default_true() -> bool {
    true
}

/// A resolved attribute type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaType {
    Bool,
    Long,
    String,
    Set(Box<SchemaType>),
    Record(BTreeMap<String, AttrType>),
    Entity(String),
}

impl SchemaType {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (SchemaType::Bool, Value::Bool(_)) => true,
            (SchemaType::Long, Value::Long(_)) => true,
            (SchemaType::String, Value::String(_)) => true,
            (SchemaType::Set(element), Value::Set(items)) => {
                items.iter().all(|item| element.matches(item))
            }
            (SchemaType::Record(shape), Value::Record(fields)) => {
                check_record(shape, fields).is_ok()
            }
            (SchemaType::Entity(name), Value::Entity(uid)) => uid.type_name() == name,
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            SchemaType::Bool => "Boolean".to_string(),
            SchemaType::Long => "Long".to_string(),
            SchemaType::String => "String".to_string(),
            SchemaType::Set(element) => format!("Set<{}>", element.describe()),
            SchemaType::Record(_) => "Record".to_string(),
            SchemaType::Entity(name) => format!("Entity<{name}>"),
        }
    }
}

/// An attribute type plus whether the attribute must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrType {
    pub ty: SchemaType,
    pub required: bool,
}

/// What one action may apply to.
#[derive(Debug, Clone, Default)]
pub struct ActionSpec {
    principal_types: BTreeSet<String>,
    resource_types: BTreeSet<String>,
    context: BTreeMap<String, AttrType>,
}

impl ActionSpec {
    /// Permitted principal types; empty means unconstrained.
    pub fn principal_types(&self) -> &BTreeSet<String> {
        &self.principal_types
    }

    /// Permitted resource types; empty means unconstrained.
    pub fn resource_types(&self) -> &BTreeSet<String> {
        &self.resource_types
    }

    /// Expected context attribute shape; empty means unchecked.
    pub fn context_shape(&self) -> &BTreeMap<String, AttrType> {
        &self.context
    }
}

#[derive(Debug)]
struct EntityTypeSpec {
    parents: BTreeSet<String>,
    attrs: BTreeMap<String, AttrType>,
}

#[derive(Debug)]
struct SchemaInner {
    entity_types: BTreeMap<String, EntityTypeSpec>,
    actions: BTreeMap<EntityUid, ActionSpec>,
}

/// An immutable schema. Cheap to clone; share freely across requests.
#[derive(Debug, Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() || name.contains("::") {
        name.to_string()
    } else {
        format!("{namespace}::{name}")
    }
}

fn resolve_type(decl: &TypeDecl, namespace: &str) -> Result<SchemaType, PolicyError> {
    match decl.kind.as_str() {
        "Boolean" => Ok(SchemaType::Bool),
        "Long" => Ok(SchemaType::Long),
        "String" => Ok(SchemaType::String),
        "Set" => {
            let element = decl.element.as_ref().ok_or_else(|| {
                PolicyError::SchemaError("Set type lacks an `element`".to_string())
            })?;
            Ok(SchemaType::Set(Box::new(resolve_type(element, namespace)?)))
        }
        "Record" => Ok(SchemaType::Record(resolve_shape(
            &decl.attributes,
            namespace,
        )?)),
        "Entity" => {
            let name = decl.name.as_ref().ok_or_else(|| {
                PolicyError::SchemaError("Entity type lacks a `name`".to_string())
            })?;
            Ok(SchemaType::Entity(qualify(namespace, name)))
        }
        other => Err(PolicyError::SchemaError(format!(
            "unknown attribute type `{other}`"
        ))),
    }
}

fn resolve_shape(
    attributes: &BTreeMap<String, AttrDecl>,
    namespace: &str,
) -> Result<BTreeMap<String, AttrType>, PolicyError> {
    let mut shape = BTreeMap::new();
    for (name, attr) in attributes {
        shape.insert(
            name.clone(),
            AttrType {
                ty: resolve_type(&attr.decl, namespace)?,
                required: attr.required,
            },
        );
    }
    Ok(shape)
}

fn check_record(
    shape: &BTreeMap<String, AttrType>,
    fields: &BTreeMap<String, Value>,
) -> Result<(), String> {
    for (name, attr) in shape {
        match fields.get(name) {
            Some(value) => {
                if !attr.ty.matches(value) {
                    return Err(format!(
                        "attribute `{name}` should be {}",
                        attr.ty.describe()
                    ));
                }
            }
            None if attr.required => {
                return Err(format!("required attribute `{name}` is missing"));
            }
            None => {}
        }
    }
    for name in fields.keys() {
        if !shape.contains_key(name) {
            return Err(format!("undeclared attribute `{name}`"));
        }
    }
    Ok(())
}

impl Schema {
    /// Parse a schema from its JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, PolicyError> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| PolicyError::SchemaError(e.to_string()))?;
        Self::from_json_value(&json)
    }

    /// Build a schema from an already-parsed JSON value.
    pub fn from_json_value(json: &serde_json::Value) -> Result<Self, PolicyError> {
        let namespaces: BTreeMap<String, NamespaceDecl> =
            serde_json::from_value(json.clone())
                .map_err(|e| PolicyError::SchemaError(e.to_string()))?;

        let mut entity_types = BTreeMap::new();
        let mut actions = BTreeMap::new();

        for (namespace, decl) in &namespaces {
            for (name, entity) in &decl.entity_types {
                let qualified = qualify(namespace, name);
                let spec = EntityTypeSpec {
                    parents: entity
                        .member_of_types
                        .iter()
                        .map(|parent| qualify(namespace, parent))
                        .collect(),
                    attrs: match &entity.shape {
                        Some(shape) => match resolve_type(shape, namespace)? {
                            SchemaType::Record(attrs) => attrs,
                            _ => {
                                return Err(PolicyError::SchemaError(format!(
                                    "shape of entity type `{qualified}` must be a Record"
                                )));
                            }
                        },
                        None => BTreeMap::new(),
                    },
                };
                if entity_types.insert(qualified.clone(), spec).is_some() {
                    return Err(PolicyError::SchemaError(format!(
                        "entity type `{qualified}` declared twice"
                    )));
                }
            }

            for (name, action) in &decl.actions {
                let action_type = qualify(namespace, "Action");
                let uid = EntityUid::new(action_type, name)?;
                let spec = match &action.applies_to {
                    Some(applies) => ActionSpec {
                        principal_types: applies
                            .principal_types
                            .iter()
                            .map(|ty| qualify(namespace, ty))
                            .collect(),
                        resource_types: applies
                            .resource_types
                            .iter()
                            .map(|ty| qualify(namespace, ty))
                            .collect(),
                        context: match &applies.context {
                            Some(context) => match resolve_type(context, namespace)? {
                                SchemaType::Record(shape) => shape,
                                _ => {
                                    return Err(PolicyError::SchemaError(format!(
                                        "context of action `{uid}` must be a Record"
                                    )));
                                }
                            },
                            None => BTreeMap::new(),
                        },
                    },
                    None => ActionSpec::default(),
                };
                if actions.insert(uid.clone(), spec).is_some() {
                    return Err(PolicyError::SchemaError(format!(
                        "action `{uid}` declared twice"
                    )));
                }
            }
        }

        Ok(Schema {
            inner: Arc::new(SchemaInner {
                entity_types,
                actions,
            }),
        })
    }

    /// Whether an action UID is declared.
    pub fn is_action_defined(&self, action: &EntityUid) -> bool {
        self.inner.actions.contains_key(action)
    }

    /// Whether an entity type is declared.
    pub fn is_entity_type_defined(&self, type_name: &str) -> bool {
        self.inner.entity_types.contains_key(type_name)
    }

    /// What one declared action applies to.
    pub fn action_spec(&self, action: &EntityUid) -> Option<&ActionSpec> {
        self.inner.actions.get(action)
    }

    /// Declared parent types of an entity type.
    pub fn parent_types(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.inner.entity_types.get(type_name).map(|spec| &spec.parents)
    }

    /// Declared attribute shape of an entity type.
    pub fn entity_shape(&self, type_name: &str) -> Option<&BTreeMap<String, AttrType>> {
        self.inner.entity_types.get(type_name).map(|spec| &spec.attrs)
    }

    /// Validate a request before evaluation.
    ///
    /// An unknown action, a principal or resource type outside the
    /// action's declared applies-to sets, or a context not matching the
    /// declared shape all fail here, before any policy is evaluated.
    pub fn validate_request(&self, request: &Request) -> Result<(), PolicyError> {
        let action = request.action();
        let Some(spec) = self.action_spec(action) else {
            return Err(PolicyError::RequestValidationError(format!(
                "unknown action {action}"
            )));
        };

        let principal_type = request.principal().type_name();
        if !spec.principal_types.is_empty() && !spec.principal_types.contains(principal_type) {
            return Err(PolicyError::RequestValidationError(format!(
                "principal type `{principal_type}` is not permitted for action {action}"
            )));
        }

        let resource_type = request.resource().type_name();
        if !spec.resource_types.is_empty() && !spec.resource_types.contains(resource_type) {
            return Err(PolicyError::RequestValidationError(format!(
                "resource type `{resource_type}` is not permitted for action {action}"
            )));
        }

        if !spec.context.is_empty() {
            let fields: BTreeMap<String, Value> = request
                .context()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            check_record(&spec.context, &fields).map_err(|e| {
                PolicyError::RequestValidationError(format!("context for action {action}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Check every concrete policy in a set against this schema.
    ///
    /// Returns human-readable findings; an empty list means no issues.
    pub fn validate_policy_set(&self, policies: &PolicySet) -> Vec<String> {
        let mut findings = Vec::new();

        for (id, policy) in policies.iter() {
            let mut action_uids: Vec<&EntityUid> = Vec::new();
            match &policy.action {
                ActionConstraint::Any => {}
                ActionConstraint::Eq(uid) => action_uids.push(uid),
                ActionConstraint::In(uids) => action_uids.extend(uids.iter()),
            }
            for uid in &action_uids {
                if !self.is_action_defined(uid) {
                    findings.push(format!("Error: policy `{id}`: unknown action {uid}"));
                }
            }

            let principal_uid = match &policy.principal {
                PrincipalConstraint::Eq(ScopeEntity::Uid(uid))
                | PrincipalConstraint::In(ScopeEntity::Uid(uid)) => Some(uid),
                _ => None,
            };
            if let Some(uid) = principal_uid {
                if !self.is_entity_type_defined(uid.type_name()) {
                    findings.push(format!(
                        "Error: policy `{id}`: unknown entity type `{}`",
                        uid.type_name()
                    ));
                }
            }

            let resource_uid = match &policy.resource {
                ResourceConstraint::Eq(ScopeEntity::Uid(uid))
                | ResourceConstraint::In(ScopeEntity::Uid(uid)) => Some(uid),
                _ => None,
            };
            if let Some(uid) = resource_uid {
                if !self.is_entity_type_defined(uid.type_name()) {
                    findings.push(format!(
                        "Error: policy `{id}`: unknown entity type `{}`",
                        uid.type_name()
                    ));
                }
            }

            // Applies-to checks only make sense against a single known
            // action.
            if let ActionConstraint::Eq(action) = &policy.action {
                if let Some(spec) = self.action_spec(action) {
                    if let Some(uid) = principal_uid {
                        if matches!(policy.principal, PrincipalConstraint::Eq(_))
                            && !spec.principal_types.is_empty()
                            && !spec.principal_types.contains(uid.type_name())
                        {
                            findings.push(format!(
                                "Error: policy `{id}`: principal type `{}` is not permitted for action {action}",
                                uid.type_name()
                            ));
                        }
                    }
                    if let Some(uid) = resource_uid {
                        if matches!(policy.resource, ResourceConstraint::Eq(_))
                            && !spec.resource_types.is_empty()
                            && !spec.resource_types.contains(uid.type_name())
                        {
                            findings.push(format!(
                                "Error: policy `{id}`: resource type `{}` is not permitted for action {action}",
                                uid.type_name()
                            ));
                        }
                    }
                }
            }
        }
        findings
    }
}
