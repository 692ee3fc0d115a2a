use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::ast::{Effect, Template};
use crate::entities::EntityStore;
use crate::error::PolicyError;
use crate::evaluator::{self, RequestEnv};
use crate::loader;
use crate::metrics;
use crate::schema::Schema;
use crate::store::PolicySet;
use crate::types::{Decision, Diagnostic, EntityUid, Outcome, PrincipalPolicies, Request};

/// Compute an authorization decision for one request.
///
/// If the request carries a schema, it is validated first; a validation
/// failure is returned as an error and no policy is evaluated. Otherwise
/// every concrete policy in the set is evaluated independently and
/// combined with deny-overrides: any matching forbid denies, else any
/// matching permit allows, else the default is deny.
///
/// The caller must not mutate `policies` or `entities` while this runs;
/// use [`PolicySet::clone_shared`] or [`PolicySet::clone_deep`] to work
/// on a copy instead.
pub fn is_authorized(
    request: &Request,
    policies: &PolicySet,
    entities: Option<&EntityStore>,
) -> Result<Decision, PolicyError> {
    if let Some(schema) = request.schema() {
        schema.validate_request(request)?;
    }
    Ok(authorize(request, policies, entities))
}

fn authorize(request: &Request, policies: &PolicySet, entities: Option<&EntityStore>) -> Decision {
    debug!(
        event = "Request",
        phase = "Evaluation",
        principal = %request.principal(),
        action = %request.action(),
        resource = %request.resource(),
    );

    let env = RequestEnv { request, entities };
    let mut diagnostics = Vec::new();
    let mut matched_permit = false;
    let mut matched_forbid = false;

    for (id, policy) in policies.iter() {
        match evaluator::policy_matches(policy, &env) {
            Ok(true) => {
                match policy.effect {
                    Effect::Permit => matched_permit = true,
                    Effect::Forbid => matched_forbid = true,
                }
                diagnostics.push(Diagnostic::Reason {
                    policy_id: id.to_string(),
                    effect: policy.effect,
                });
            }
            Ok(false) => {}
            Err(e) => {
                // A single policy failing to evaluate degrades to a
                // non-match; the decision still gets made.
                warn!(event = "Request", phase = "Policy", policy_id = id, error = %e);
                diagnostics.push(Diagnostic::Warning {
                    policy_id: id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    let outcome = if matched_forbid {
        Outcome::Deny
    } else if matched_permit {
        Outcome::Allow
    } else {
        Outcome::Deny
    };

    debug!(event = "Request", phase = "Result", decision = %outcome);
    Decision::new(outcome, diagnostics)
}

/// Check that `text` parses as a single concrete policy.
pub fn validate_policy(text: &str) -> Result<bool, PolicyError> {
    loader::compile_policy(text).map(|_| true)
}

/// Check that `text` parses as a single template.
pub fn validate_template(text: &str) -> Result<bool, PolicyError> {
    loader::compile_template(text).map(|_| true)
}

/// Validate every policy in a set against a schema.
///
/// An empty list means no findings.
pub fn validate_policies(
    policies: &PolicySet,
    schema: &Schema,
) -> Result<Vec<String>, PolicyError> {
    Ok(schema.validate_policy_set(policies))
}

/// The main engine handle. Cloneable and thread-safe.
///
/// Wraps a [`PolicySet`] behind a read-write lock so one handle can
/// serve concurrent evaluations while another reloads or edits policies.
/// The free [`is_authorized`] stays lock-free for callers that manage
/// synchronization themselves.
#[derive(Clone, Default)]
pub struct PolicyEngine {
    inner: Arc<RwLock<PolicySet>>,
    schema: Option<Schema>,
}

impl PolicyEngine {
    /// Create an engine with an empty policy set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine from a policy document.
    pub fn new_from_str(policy_text: &str) -> Result<Self, PolicyError> {
        Ok(PolicyEngine {
            inner: Arc::new(RwLock::new(PolicySet::from_str(policy_text)?)),
            schema: None,
        })
    }

    /// Attach a schema validated against every request this engine
    /// evaluates. A schema carried by the request itself takes
    /// precedence.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Replace the whole policy set from a policy document.
    pub fn reload_from_str(&self, policy_text: &str) -> Result<(), PolicyError> {
        let new_set = PolicySet::from_str(policy_text)?;
        *self.inner.write()? = new_set;
        info!(event = "Reload", phase = "Complete");
        metrics::record_reload();
        Ok(())
    }

    /// Add one policy from source text.
    pub fn add_policy(&self, id: impl Into<String>, text: &str) -> Result<(), PolicyError> {
        self.inner.write()?.add_policy_str(id, text)
    }

    /// Add a whole document of policies, all or nothing.
    pub fn add_policies_from_str(&self, text: &str) -> Result<Vec<String>, PolicyError> {
        self.inner.write()?.add_policies_from_str(text)
    }

    /// Add a template.
    pub fn add_template(&self, template: Template) -> Result<(), PolicyError> {
        self.inner.write()?.add_template(template)
    }

    /// Materialize a template into a stored policy.
    pub fn add_template_linked_policy(
        &self,
        policy_id: impl Into<String>,
        template_id: &str,
        slot_values: &BTreeMap<String, String>,
    ) -> Result<(), PolicyError> {
        self.inner
            .write()?
            .add_template_linked_policy(policy_id, template_id, slot_values)
    }

    /// Evaluate a request with no entity graph.
    pub fn evaluate(&self, request: &Request) -> Result<Decision, PolicyError> {
        self.evaluate_with_entities(request, None)
    }

    /// Evaluate a request against this engine's policies and an entity
    /// graph.
    pub fn evaluate_with_entities(
        &self,
        request: &Request,
        entities: Option<&EntityStore>,
    ) -> Result<Decision, PolicyError> {
        let start = Instant::now();

        if let Some(schema) = request.schema().or(self.schema.as_ref()) {
            schema.validate_request(request)?;
        }

        let decision = {
            let guard = self.inner.read()?;
            authorize(request, &guard, entities)
        };

        metrics::record_evaluation(
            decision.is_allowed(),
            start.elapsed(),
            request.principal().to_string(),
            request.action().to_string(),
        );
        Ok(decision)
    }

    /// The policies whose principal scope covers `principal`.
    pub fn list_policies_for_principal(
        &self,
        principal: &EntityUid,
        entities: Option<&EntityStore>,
    ) -> Result<PrincipalPolicies, PolicyError> {
        let guard = self.inner.read()?;
        Ok(guard.policies_for_principal(principal, entities))
    }

    /// A shared-payload snapshot of the current policy set.
    ///
    /// The snapshot is independent: later edits through this engine do
    /// not show up in it.
    pub fn snapshot(&self) -> Result<PolicySet, PolicyError> {
        Ok(self.inner.read()?.clone_shared())
    }

    /// Number of concrete policies currently loaded.
    pub fn policy_count(&self) -> Result<usize, PolicyError> {
        Ok(self.inner.read()?.len())
    }
}

#[cfg(test)]
mod tests;
