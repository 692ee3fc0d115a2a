use crate::ast::Policy;
use crate::error::PolicyError;
use crate::parser;

/// Compile a document of zero or more concrete policies.
///
/// Any parse failure is reported as `PolicyError::ParseError`; slots are
/// rejected (a policy with slots is a template, not a policy).
///
/// Example:
/// ```rust
/// use palisade_core::compile_policy_set;
/// let policy_text = r#"
///     permit (principal, action, resource);
///     forbid (principal == User::"evil", action, resource);
/// "#;
/// let policies = compile_policy_set(policy_text).unwrap();
/// assert_eq!(policies.len(), 2);
/// ```
pub fn compile_policy_set(text: &str) -> Result<Vec<Policy>, PolicyError> {
    parser::parse_policies(text, false)
}

/// Compile exactly one concrete policy.
///
/// Example:
/// ```rust
/// use palisade_core::compile_policy;
/// let policy = compile_policy(r#"permit(principal == User::"alice", action, resource);"#);
/// assert!(policy.is_ok());
/// ```
pub fn compile_policy(text: &str) -> Result<Policy, PolicyError> {
    parser::parse_single(text, false)
}

/// Compile a template body: exactly one policy whose scope names at
/// least one slot.
pub fn compile_template(text: &str) -> Result<Policy, PolicyError> {
    let policy = parser::parse_single(text, true)?;
    if !policy.has_slots() {
        return Err(PolicyError::ParseError(
            "template scope contains no slots".to_string(),
        ));
    }
    Ok(policy)
}
