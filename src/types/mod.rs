//! Data model types for requests, values, and decisions.
//!
//! Canonical string forms:
//! - Entity UID: `Type::"id"` or `NS::Type::"id"`, id quoted with `\"` and
//!   `\\` escapes
//! - Actions are plain entities, conventionally `Action::"name"`
//!
//! Requests carry validated UIDs only; malformed input is rejected at the
//! edges, never inside evaluation.

mod context;
mod decision;
mod entity_uid;
mod principal_policies;
mod request;
mod value;

pub use context::RequestContext;
pub use decision::{Decision, Diagnostic, Outcome};
pub use entity_uid::EntityUid;
pub(crate) use entity_uid::{escape, unescape};
pub use principal_policies::PrincipalPolicies;
pub use request::Request;
pub use value::{Value, ValueKind};
