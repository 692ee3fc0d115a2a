//! Scope matching and condition evaluation for a single policy.
//!
//! The authorizer calls [`policy_matches`] once per stored policy. Any
//! [`EvalError`] degrades that one policy to a non-match; it never aborts
//! the overall decision.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::ast::{
    ActionConstraint, BinaryOp, ConditionKind, Expr, Policy, PrincipalConstraint,
    ResourceConstraint, ScopeEntity, SetMethod, Var,
};
use crate::entities::EntityStore;
use crate::types::{EntityUid, Request, Value, ValueKind};

/// Evaluation failure for one policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum EvalError {
    #[error("entity `{uid}` has no attribute `{attr}`")]
    AttributeNotFound { uid: EntityUid, attr: String },

    #[error("record has no attribute `{attr}`")]
    RecordAttributeNotFound { attr: String },

    #[error("`{op}` expects {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: ValueKind,
    },

    #[error("policy scope contains an unlinked slot")]
    UnresolvedSlot,
}

/// Everything a single evaluation reads: the request plus the entity
/// graph, both immutable for the duration of the call.
pub(crate) struct RequestEnv<'a> {
    pub(crate) request: &'a Request,
    pub(crate) entities: Option<&'a EntityStore>,
}

impl RequestEnv<'_> {
    fn ancestors(&self, uid: &EntityUid) -> BTreeSet<EntityUid> {
        self.entities
            .map(|store| store.ancestors(uid))
            .unwrap_or_default()
    }

    /// The `in` relation over entities: equality or ancestry.
    fn entity_in(&self, child: &EntityUid, parent: &EntityUid) -> bool {
        child == parent || self.ancestors(child).contains(parent)
    }
}

/// Whether `constraint` covers `uid`, given the uid's ancestor closure.
pub(crate) fn principal_covers(
    constraint: &PrincipalConstraint,
    uid: &EntityUid,
    ancestors: &BTreeSet<EntityUid>,
) -> Result<bool, EvalError> {
    match constraint {
        PrincipalConstraint::Any => Ok(true),
        PrincipalConstraint::Eq(ScopeEntity::Uid(u)) => Ok(u == uid),
        PrincipalConstraint::In(ScopeEntity::Uid(u)) => Ok(u == uid || ancestors.contains(u)),
        PrincipalConstraint::Eq(ScopeEntity::Slot(_))
        | PrincipalConstraint::In(ScopeEntity::Slot(_)) => Err(EvalError::UnresolvedSlot),
    }
}

fn resource_covers(
    constraint: &ResourceConstraint,
    uid: &EntityUid,
    ancestors: &BTreeSet<EntityUid>,
) -> Result<bool, EvalError> {
    match constraint {
        ResourceConstraint::Any => Ok(true),
        ResourceConstraint::Eq(ScopeEntity::Uid(u)) => Ok(u == uid),
        ResourceConstraint::In(ScopeEntity::Uid(u)) => Ok(u == uid || ancestors.contains(u)),
        ResourceConstraint::Eq(ScopeEntity::Slot(_))
        | ResourceConstraint::In(ScopeEntity::Slot(_)) => Err(EvalError::UnresolvedSlot),
    }
}

fn action_covers(
    constraint: &ActionConstraint,
    uid: &EntityUid,
    ancestors: &BTreeSet<EntityUid>,
) -> bool {
    match constraint {
        ActionConstraint::Any => true,
        ActionConstraint::Eq(u) => u == uid,
        ActionConstraint::In(uids) => uids.iter().any(|u| u == uid || ancestors.contains(u)),
    }
}

/// Whether a policy's scope and conditions both cover the request.
pub(crate) fn policy_matches(policy: &Policy, env: &RequestEnv<'_>) -> Result<bool, EvalError> {
    let request = env.request;

    if !principal_covers(
        &policy.principal,
        request.principal(),
        &env.ancestors(request.principal()),
    )? {
        return Ok(false);
    }
    if !action_covers(
        &policy.action,
        request.action(),
        &env.ancestors(request.action()),
    ) {
        return Ok(false);
    }
    if !resource_covers(
        &policy.resource,
        request.resource(),
        &env.ancestors(request.resource()),
    )? {
        return Ok(false);
    }

    for condition in &policy.conditions {
        let holds = match eval(&condition.body, env)? {
            Value::Bool(b) => b,
            other => {
                return Err(EvalError::TypeMismatch {
                    op: "condition",
                    expected: "Bool",
                    found: other.kind(),
                });
            }
        };
        let keep = match condition.kind {
            ConditionKind::When => holds,
            ConditionKind::Unless => !holds,
        };
        if !keep {
            return Ok(false);
        }
    }
    Ok(true)
}

fn as_bool(value: Value, op: &'static str) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| EvalError::TypeMismatch {
        op,
        expected: "Bool",
        found: value.kind(),
    })
}

fn as_long(value: Value, op: &'static str) -> Result<i64, EvalError> {
    value.as_long().ok_or_else(|| EvalError::TypeMismatch {
        op,
        expected: "Long",
        found: value.kind(),
    })
}

fn as_set(value: Value, op: &'static str) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Set(items) => Ok(items),
        other => Err(EvalError::TypeMismatch {
            op,
            expected: "Set",
            found: other.kind(),
        }),
    }
}

fn eval(expr: &Expr, env: &RequestEnv<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Var(Var::Principal) => Ok(Value::Entity(env.request.principal().clone())),
        Expr::Var(Var::Action) => Ok(Value::Entity(env.request.action().clone())),
        Expr::Var(Var::Resource) => Ok(Value::Entity(env.request.resource().clone())),
        Expr::Var(Var::Context) => Ok(env.request.context().to_record()),

        Expr::And(left, right) => {
            if !as_bool(eval(left, env)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(as_bool(eval(right, env)?, "&&")?))
        }
        Expr::Or(left, right) => {
            if as_bool(eval(left, env)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(as_bool(eval(right, env)?, "||")?))
        }
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(eval(inner, env)?, "!")?)),

        Expr::Binary { op, left, right } => {
            let lhs = eval(left, env)?;
            let rhs = eval(right, env)?;
            match op {
                // Equality across mismatched variants is false, never an
                // error.
                BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
                BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
                BinaryOp::Less => Ok(Value::Bool(as_long(lhs, "<")? < as_long(rhs, "<")?)),
                BinaryOp::LessEq => Ok(Value::Bool(as_long(lhs, "<=")? <= as_long(rhs, "<=")?)),
                BinaryOp::Greater => Ok(Value::Bool(as_long(lhs, ">")? > as_long(rhs, ">")?)),
                BinaryOp::GreaterEq => {
                    Ok(Value::Bool(as_long(lhs, ">=")? >= as_long(rhs, ">=")?))
                }
                BinaryOp::In => {
                    let child = match lhs {
                        Value::Entity(uid) => uid,
                        other => {
                            return Err(EvalError::TypeMismatch {
                                op: "in",
                                expected: "Entity",
                                found: other.kind(),
                            });
                        }
                    };
                    match rhs {
                        Value::Entity(parent) => Ok(Value::Bool(env.entity_in(&child, &parent))),
                        Value::Set(items) => {
                            for item in items {
                                match item {
                                    Value::Entity(parent) => {
                                        if env.entity_in(&child, &parent) {
                                            return Ok(Value::Bool(true));
                                        }
                                    }
                                    other => {
                                        return Err(EvalError::TypeMismatch {
                                            op: "in",
                                            expected: "Set of entities",
                                            found: other.kind(),
                                        });
                                    }
                                }
                            }
                            Ok(Value::Bool(false))
                        }
                        other => Err(EvalError::TypeMismatch {
                            op: "in",
                            expected: "Entity or Set",
                            found: other.kind(),
                        }),
                    }
                }
            }
        }

        Expr::GetAttr { expr, attr } => match eval(expr, env)? {
            Value::Entity(uid) => env
                .entities
                .and_then(|store| store.attribute(&uid, attr))
                .cloned()
                .ok_or_else(|| EvalError::AttributeNotFound {
                    uid,
                    attr: attr.clone(),
                }),
            Value::Record(fields) => {
                fields
                    .get(attr)
                    .cloned()
                    .ok_or_else(|| EvalError::RecordAttributeNotFound { attr: attr.clone() })
            }
            other => Err(EvalError::TypeMismatch {
                op: "attribute access",
                expected: "Entity or Record",
                found: other.kind(),
            }),
        },

        Expr::HasAttr { expr, attr } => match eval(expr, env)? {
            Value::Entity(uid) => Ok(Value::Bool(
                env.entities
                    .map(|store| store.attribute(&uid, attr).is_some())
                    .unwrap_or(false),
            )),
            Value::Record(fields) => Ok(Value::Bool(fields.contains_key(attr))),
            other => Err(EvalError::TypeMismatch {
                op: "has",
                expected: "Entity or Record",
                found: other.kind(),
            }),
        },

        Expr::Method {
            method,
            receiver,
            arg,
        } => {
            let receiver = as_set(eval(receiver, env)?, "set method receiver")?;
            let arg = eval(arg, env)?;
            match method {
                SetMethod::Contains => Ok(Value::Bool(receiver.contains(&arg))),
                SetMethod::ContainsAll => {
                    let arg = as_set(arg, "containsAll")?;
                    Ok(Value::Bool(arg.iter().all(|v| receiver.contains(v))))
                }
                SetMethod::ContainsAny => {
                    let arg = as_set(arg, "containsAny")?;
                    Ok(Value::Bool(arg.iter().any(|v| receiver.contains(v))))
                }
            }
        }

        Expr::Set(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Set),

        Expr::Record(fields) => {
            let mut out = std::collections::BTreeMap::new();
            for (key, value) in fields {
                out.insert(key.clone(), eval(value, env)?);
            }
            Ok(Value::Record(out))
        }
    }
}
