//! Authorization decisions and their diagnostics.

use std::fmt::{self, Formatter};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::ast::Effect;

/// Allow or deny.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
pub enum Outcome {
    Allow,
    Deny,
}

/// One entry in a decision's diagnostics.
///
/// `Reason` entries name the policies that matched the request, in the
/// order they were evaluated. `Warning` entries record evaluation
/// problems that degraded a single policy to a non-match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    Reason { policy_id: String, effect: Effect },
    Warning { policy_id: String, message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Reason { policy_id, effect } => {
                write!(f, "Reason: {policy_id} ({effect})")
            }
            Diagnostic::Warning { policy_id, message } => {
                write!(f, "Warning: {policy_id}: {message}")
            }
        }
    }
}

/// The result of one authorization request.
///
/// Produced fresh per request and never mutated afterwards. Truthy iff
/// the outcome is `Allow`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    outcome: Outcome,
    diagnostics: Vec<Diagnostic>,
}

impl Decision {
    pub(crate) fn new(outcome: Outcome, diagnostics: Vec<Diagnostic>) -> Self {
        Decision {
            outcome,
            diagnostics,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    /// All diagnostic entries, in evaluation order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Ids of the policies that matched, in evaluation order.
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.iter().filter_map(|d| match d {
            Diagnostic::Reason { policy_id, .. } => Some(policy_id.as_str()),
            Diagnostic::Warning { .. } => None,
        })
    }

    /// Warnings recorded while evaluating, in evaluation order.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::Warning { .. }))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Allow => {
                let ids: Vec<&str> = self.reasons().collect();
                write!(f, "Allow({})", ids.join(", "))
            }
            Outcome::Deny => write!(f, "Deny"),
        }
    }
}

impl From<Decision> for bool {
    fn from(decision: Decision) -> Self {
        decision.is_allowed()
    }
}
