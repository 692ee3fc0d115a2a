// src/lib.rs
pub use ast::{
    ActionConstraint, BinaryOp, Condition, ConditionKind, Effect, Expr, Policy,
    PrincipalConstraint, ResourceConstraint, ScopeEntity, SetMethod, SlotId, Template, Var,
};
pub use engine::{
    PolicyEngine, is_authorized, validate_policies, validate_policy, validate_template,
};
pub use entities::EntityStore;
pub use error::PolicyError;
pub use loader::{compile_policy, compile_policy_set, compile_template};
pub use schema::{ActionSpec, AttrType, Schema, SchemaType};
pub use store::{PolicyOrigin, PolicySet};
pub use types::{
    Decision, Diagnostic, EntityUid, Outcome, PrincipalPolicies, Request, RequestContext, Value,
    ValueKind,
};

mod ast;
mod engine;
mod entities;
mod error;
mod evaluator;
mod loader;
pub mod metrics;
mod parser;
mod schema;
mod store;
mod types;
