//! Parsed policy representation.
//!
//! Policies arrive here through the parser and stay in this form for
//! storage, linking, validation, and evaluation. `Display` renders the
//! canonical single-line text, which is what `PolicySet::get_policy`
//! returns.

use std::collections::BTreeMap;
use std::fmt::{self, Formatter};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::PolicyError;
use crate::types::{EntityUid, Value};

/// What a matching policy contributes to the decision.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Permit,
    Forbid,
}

/// A named template slot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SlotId {
    #[strum(serialize = "?principal")]
    Principal,
    #[strum(serialize = "?resource")]
    Resource,
}

/// A scope operand: a literal UID in a concrete policy, or a slot in a
/// template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeEntity {
    Uid(EntityUid),
    Slot(SlotId),
}

impl fmt::Display for ScopeEntity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScopeEntity::Uid(uid) => write!(f, "{uid}"),
            ScopeEntity::Slot(slot) => write!(f, "{slot}"),
        }
    }
}

/// Scope constraint on the principal slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "entity", rename_all = "lowercase")]
pub enum PrincipalConstraint {
    #[serde(rename = "all")]
    Any,
    #[serde(rename = "==")]
    Eq(ScopeEntity),
    In(ScopeEntity),
}

/// Scope constraint on the action slot. Actions take no template slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "entities", rename_all = "lowercase")]
pub enum ActionConstraint {
    #[serde(rename = "all")]
    Any,
    #[serde(rename = "==")]
    Eq(EntityUid),
    In(Vec<EntityUid>),
}

/// Scope constraint on the resource slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "entity", rename_all = "lowercase")]
pub enum ResourceConstraint {
    #[serde(rename = "all")]
    Any,
    #[serde(rename = "==")]
    Eq(ScopeEntity),
    In(ScopeEntity),
}

/// `when` keeps the policy applicable if its body is true; `unless` if
/// its body is false.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    When,
    Unless,
}

/// One `when { .. }` or `unless { .. }` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub body: Expr,
}

/// Request variables available inside conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

/// Binary operators. Ordering applies to longs only; `in` tests entity
/// hierarchy membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum BinaryOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEq,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEq,
    #[strum(serialize = "in")]
    In,
}

/// Set membership methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SetMethod {
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "containsAll")]
    ContainsAll,
    #[strum(serialize = "containsAny")]
    ContainsAny,
}

/// A condition expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Lit(Value),
    Var(Var),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    GetAttr {
        expr: Box<Expr>,
        attr: String,
    },
    HasAttr {
        expr: Box<Expr>,
        attr: String,
    },
    Method {
        method: SetMethod,
        receiver: Box<Expr>,
        arg: Box<Expr>,
    },
    Set(Vec<Expr>),
    Record(Vec<(String, Expr)>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Binary { .. } | Expr::HasAttr { .. } => 3,
            Expr::Not(..) => 4,
            Expr::GetAttr { .. } | Expr::Method { .. } => 5,
            Expr::Lit(..) | Expr::Var(..) | Expr::Set(..) | Expr::Record(..) => 6,
        }
    }

    fn fmt_prec(&self, f: &mut Formatter<'_>, min: u8) -> fmt::Result {
        let own = self.precedence();
        if own < min {
            write!(f, "(")?;
        }
        match self {
            Expr::Lit(value) => fmt_value(value, f)?,
            Expr::Var(var) => write!(f, "{var}")?,
            Expr::Or(left, right) => {
                left.fmt_prec(f, 1)?;
                write!(f, " || ")?;
                right.fmt_prec(f, 2)?;
            }
            Expr::And(left, right) => {
                left.fmt_prec(f, 2)?;
                write!(f, " && ")?;
                right.fmt_prec(f, 3)?;
            }
            Expr::Not(inner) => {
                write!(f, "!")?;
                inner.fmt_prec(f, 4)?;
            }
            Expr::Binary { op, left, right } => {
                left.fmt_prec(f, 4)?;
                write!(f, " {op} ")?;
                right.fmt_prec(f, 4)?;
            }
            Expr::GetAttr { expr, attr } => {
                expr.fmt_prec(f, 5)?;
                if is_ident(attr) {
                    write!(f, ".{attr}")?;
                } else {
                    write!(f, "[\"{}\"]", crate::types::escape(attr))?;
                }
            }
            Expr::HasAttr { expr, attr } => {
                expr.fmt_prec(f, 4)?;
                if is_ident(attr) {
                    write!(f, " has {attr}")?;
                } else {
                    write!(f, " has \"{attr}\"")?;
                }
            }
            Expr::Method {
                method,
                receiver,
                arg,
            } => {
                receiver.fmt_prec(f, 5)?;
                write!(f, ".{method}(")?;
                arg.fmt_prec(f, 1)?;
                write!(f, ")")?;
            }
            Expr::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_prec(f, 1)?;
                }
                write!(f, "]")?;
            }
            Expr::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if is_ident(key) {
                        write!(f, "{key}: ")?;
                    } else {
                        write!(f, "\"{key}\": ")?;
                    }
                    value.fmt_prec(f, 1)?;
                }
                write!(f, "}}")?;
            }
        }
        if own < min {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

fn fmt_value(value: &Value, f: &mut Formatter<'_>) -> fmt::Result {
    match value {
        Value::Bool(b) => write!(f, "{b}"),
        Value::Long(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "\"{}\"", crate::types::escape(s)),
        Value::Entity(uid) => write!(f, "{uid}"),
        Value::Set(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_value(item, f)?;
            }
            write!(f, "]")
        }
        Value::Record(fields) => {
            write!(f, "{{")?;
            for (i, (key, val)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                if is_ident(key) {
                    write!(f, "{key}: ")?;
                } else {
                    write!(f, "\"{key}\": ")?;
                }
                fmt_value(val, f)?;
            }
            write!(f, "}}")
        }
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One declarative policy: an effect, a three-part scope, and zero or
/// more conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub effect: Effect,
    pub principal: PrincipalConstraint,
    pub action: ActionConstraint,
    pub resource: ResourceConstraint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Policy {
    /// The slots referenced by this policy's scope, if any.
    pub fn slots(&self) -> Vec<SlotId> {
        let mut slots = Vec::new();
        match &self.principal {
            PrincipalConstraint::Eq(ScopeEntity::Slot(slot))
            | PrincipalConstraint::In(ScopeEntity::Slot(slot)) => slots.push(*slot),
            _ => {}
        }
        match &self.resource {
            ResourceConstraint::Eq(ScopeEntity::Slot(slot))
            | ResourceConstraint::In(ScopeEntity::Slot(slot)) => slots.push(*slot),
            _ => {}
        }
        slots
    }

    pub fn has_slots(&self) -> bool {
        !self.slots().is_empty()
    }

    /// The `@id(..)` annotation, when the author supplied one.
    pub fn id_annotation(&self) -> Option<&str> {
        self.annotations.get("id").map(String::as_str)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.annotations {
            write!(f, "@{key}(\"{}\") ", crate::types::escape(value))?;
        }
        write!(f, "{}(principal", self.effect)?;
        match &self.principal {
            PrincipalConstraint::Any => {}
            PrincipalConstraint::Eq(e) => write!(f, " == {e}")?,
            PrincipalConstraint::In(e) => write!(f, " in {e}")?,
        }
        write!(f, ", action")?;
        match &self.action {
            ActionConstraint::Any => {}
            ActionConstraint::Eq(uid) => write!(f, " == {uid}")?,
            ActionConstraint::In(uids) => {
                if let [single] = uids.as_slice() {
                    write!(f, " in {single}")?;
                } else {
                    write!(f, " in [")?;
                    for (i, uid) in uids.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{uid}")?;
                    }
                    write!(f, "]")?;
                }
            }
        }
        write!(f, ", resource")?;
        match &self.resource {
            ResourceConstraint::Any => {}
            ResourceConstraint::Eq(e) => write!(f, " == {e}")?,
            ResourceConstraint::In(e) => write!(f, " in {e}")?,
        }
        write!(f, ")")?;
        for condition in &self.conditions {
            write!(f, " {} {{ {} }}", condition.kind, condition.body)?;
        }
        write!(f, ";")
    }
}

/// A policy whose scope names at least one slot, stored by id and
/// instantiated via [`Template::link`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    id: String,
    body: Policy,
}

impl Template {
    /// Parse template source text. Fails when the text does not parse or
    /// when the scope names no slots.
    pub fn new(id: impl Into<String>, text: &str) -> Result<Self, PolicyError> {
        Ok(Template {
            id: id.into(),
            body: crate::loader::compile_template(text)?,
        })
    }

    /// Wrap an already-parsed template body.
    pub fn from_policy(id: impl Into<String>, body: Policy) -> Result<Self, PolicyError> {
        if !body.has_slots() {
            return Err(PolicyError::ParseError(
                "template scope contains no slots".to_string(),
            ));
        }
        Ok(Template {
            id: id.into(),
            body,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &Policy {
        &self.body
    }

    pub fn slots(&self) -> Vec<SlotId> {
        self.body.slots()
    }

    /// Materialize a concrete policy by substituting every slot.
    ///
    /// Every slot the scope references must be bound, and every binding
    /// must name a referenced slot.
    pub fn link(&self, values: &BTreeMap<SlotId, EntityUid>) -> Result<Policy, PolicyError> {
        let referenced = self.body.slots();
        for slot in &referenced {
            if !values.contains_key(slot) {
                return Err(PolicyError::MissingSlot(slot.to_string()));
            }
        }
        for slot in values.keys() {
            if !referenced.contains(slot) {
                return Err(PolicyError::UnknownSlot(format!(
                    "{slot} is not used by template `{}`",
                    self.id
                )));
            }
        }

        let fill = |entity: &ScopeEntity| -> ScopeEntity {
            match entity {
                ScopeEntity::Slot(slot) => ScopeEntity::Uid(values[slot].clone()),
                uid @ ScopeEntity::Uid(_) => uid.clone(),
            }
        };

        let mut policy = self.body.clone();
        policy.principal = match &self.body.principal {
            PrincipalConstraint::Any => PrincipalConstraint::Any,
            PrincipalConstraint::Eq(e) => PrincipalConstraint::Eq(fill(e)),
            PrincipalConstraint::In(e) => PrincipalConstraint::In(fill(e)),
        };
        policy.resource = match &self.body.resource {
            ResourceConstraint::Any => ResourceConstraint::Any,
            ResourceConstraint::Eq(e) => ResourceConstraint::Eq(fill(e)),
            ResourceConstraint::In(e) => ResourceConstraint::In(fill(e)),
        };
        Ok(policy)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body)
    }
}
