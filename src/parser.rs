//! Tokenizer and recursive-descent parser for policy source text.
//!
//! The grammar covers concrete policies and templates: an effect, a
//! three-part scope (`==` / `in` constraints, slots in templates), and
//! `when`/`unless` condition expressions. All failures are reported as
//! `PolicyError::ParseError` with a byte offset.

use std::collections::BTreeMap;

use crate::ast::{
    ActionConstraint, BinaryOp, Condition, ConditionKind, Effect, Expr, Policy,
    PrincipalConstraint, ResourceConstraint, ScopeEntity, SetMethod, SlotId, Var,
};
use crate::error::PolicyError;
use crate::types::{EntityUid, Value, unescape};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Slot(String),
    At,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    Colon,
    DoubleColon,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Minus,
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tok::Ident(s) => write!(f, "`{s}`"),
            Tok::Str(s) => write!(f, "string \"{s}\""),
            Tok::Int(n) => write!(f, "integer {n}"),
            Tok::Slot(s) => write!(f, "`?{s}`"),
            Tok::At => write!(f, "`@`"),
            Tok::LParen => write!(f, "`(`"),
            Tok::RParen => write!(f, "`)`"),
            Tok::LBracket => write!(f, "`[`"),
            Tok::RBracket => write!(f, "`]`"),
            Tok::LBrace => write!(f, "`{{`"),
            Tok::RBrace => write!(f, "`}}`"),
            Tok::Comma => write!(f, "`,`"),
            Tok::Semi => write!(f, "`;`"),
            Tok::Dot => write!(f, "`.`"),
            Tok::Colon => write!(f, "`:`"),
            Tok::DoubleColon => write!(f, "`::`"),
            Tok::EqEq => write!(f, "`==`"),
            Tok::NotEq => write!(f, "`!=`"),
            Tok::Lt => write!(f, "`<`"),
            Tok::Le => write!(f, "`<=`"),
            Tok::Gt => write!(f, "`>`"),
            Tok::Ge => write!(f, "`>=`"),
            Tok::AndAnd => write!(f, "`&&`"),
            Tok::OrOr => write!(f, "`||`"),
            Tok::Bang => write!(f, "`!`"),
            Tok::Minus => write!(f, "`-`"),
        }
    }
}

#[derive(Debug)]
struct Spanned {
    tok: Tok,
    at: usize,
}

fn err_at(at: usize, msg: impl std::fmt::Display) -> PolicyError {
    PolicyError::ParseError(format!("{msg} at offset {at}"))
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, PolicyError> {
    let mut toks = Vec::new();
    let mut it = src.char_indices().peekable();

    while let Some(&(at, c)) = it.peek() {
        match c {
            c if c.is_whitespace() => {
                it.next();
            }
            '/' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '/'))) {
                    for (_, c2) in it.by_ref() {
                        if c2 == '\n' {
                            break;
                        }
                    }
                } else {
                    return Err(err_at(at, "unexpected `/`"));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&(_, c2)) = it.peek() {
                    if c2.is_ascii_alphanumeric() || c2 == '_' {
                        s.push(c2);
                        it.next();
                    } else {
                        break;
                    }
                }
                toks.push(Spanned {
                    tok: Tok::Ident(s),
                    at,
                });
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&(_, c2)) = it.peek() {
                    if c2.is_ascii_digit() {
                        s.push(c2);
                        it.next();
                    } else {
                        break;
                    }
                }
                let n = s
                    .parse::<i64>()
                    .map_err(|_| err_at(at, "integer literal out of range"))?;
                toks.push(Spanned {
                    tok: Tok::Int(n),
                    at,
                });
            }
            '"' => {
                it.next();
                let mut raw = String::new();
                loop {
                    match it.next() {
                        None => return Err(err_at(at, "unterminated string")),
                        Some((_, '"')) => break,
                        Some((_, '\\')) => {
                            raw.push('\\');
                            match it.next() {
                                Some((_, c2)) => raw.push(c2),
                                None => return Err(err_at(at, "unterminated string")),
                            }
                        }
                        Some((_, c2)) => raw.push(c2),
                    }
                }
                let s = unescape(&raw).map_err(|e| err_at(at, e))?;
                toks.push(Spanned {
                    tok: Tok::Str(s),
                    at,
                });
            }
            '?' => {
                it.next();
                let mut name = String::new();
                while let Some(&(_, c2)) = it.peek() {
                    if c2.is_ascii_alphanumeric() || c2 == '_' {
                        name.push(c2);
                        it.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(err_at(at, "expected a slot name after `?`"));
                }
                toks.push(Spanned {
                    tok: Tok::Slot(name),
                    at,
                });
            }
            ':' => {
                it.next();
                if matches!(it.peek(), Some(&(_, ':'))) {
                    it.next();
                    toks.push(Spanned {
                        tok: Tok::DoubleColon,
                        at,
                    });
                } else {
                    toks.push(Spanned { tok: Tok::Colon, at });
                }
            }
            '=' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '='))) {
                    it.next();
                    toks.push(Spanned { tok: Tok::EqEq, at });
                } else {
                    return Err(err_at(at, "expected `==`"));
                }
            }
            '!' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '='))) {
                    it.next();
                    toks.push(Spanned { tok: Tok::NotEq, at });
                } else {
                    toks.push(Spanned { tok: Tok::Bang, at });
                }
            }
            '<' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '='))) {
                    it.next();
                    toks.push(Spanned { tok: Tok::Le, at });
                } else {
                    toks.push(Spanned { tok: Tok::Lt, at });
                }
            }
            '>' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '='))) {
                    it.next();
                    toks.push(Spanned { tok: Tok::Ge, at });
                } else {
                    toks.push(Spanned { tok: Tok::Gt, at });
                }
            }
            '&' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '&'))) {
                    it.next();
                    toks.push(Spanned {
                        tok: Tok::AndAnd,
                        at,
                    });
                } else {
                    return Err(err_at(at, "expected `&&`"));
                }
            }
            '|' => {
                it.next();
                if matches!(it.peek(), Some(&(_, '|'))) {
                    it.next();
                    toks.push(Spanned { tok: Tok::OrOr, at });
                } else {
                    return Err(err_at(at, "expected `||`"));
                }
            }
            _ => {
                let tok = match c {
                    '@' => Tok::At,
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    ',' => Tok::Comma,
                    ';' => Tok::Semi,
                    '.' => Tok::Dot,
                    '-' => Tok::Minus,
                    other => return Err(err_at(at, format!("unexpected character `{other}`"))),
                };
                it.next();
                toks.push(Spanned { tok, at });
            }
        }
    }
    Ok(toks)
}

struct Parser {
    toks: Vec<Spanned>,
    pos: usize,
    allow_slots: bool,
    len: usize,
}

impl Parser {
    fn new(src: &str, allow_slots: bool) -> Result<Self, PolicyError> {
        Ok(Parser {
            toks: tokenize(src)?,
            pos: 0,
            allow_slots,
            len: src.len(),
        })
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn offset(&self) -> usize {
        self.toks.get(self.pos).map_or(self.len, |s| s.at)
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|s| &s.tok)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.toks.get(self.pos + 1).map(|s| &s.tok)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|s| s.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, msg: impl std::fmt::Display) -> PolicyError {
        err_at(self.offset(), msg)
    }

    fn expect(&mut self, want: Tok) -> Result<(), PolicyError> {
        match self.peek() {
            Some(tok) if *tok == want => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.err(format!("expected {want}, found {tok}"))),
            None => Err(self.err(format!("expected {want}, found end of input"))),
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, word: &str) -> Result<(), PolicyError> {
        if self.eat_ident(word) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{word}`")))
        }
    }

    fn any_ident(&mut self) -> Result<String, PolicyError> {
        match self.peek() {
            Some(Tok::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.err("expected an identifier")),
        }
    }

    fn policy(&mut self) -> Result<Policy, PolicyError> {
        let mut annotations = BTreeMap::new();
        while matches!(self.peek(), Some(Tok::At)) {
            self.pos += 1;
            let key = self.any_ident()?;
            self.expect(Tok::LParen)?;
            let value = match self.next() {
                Some(Tok::Str(s)) => s,
                _ => return Err(self.err("expected a quoted annotation value")),
            };
            self.expect(Tok::RParen)?;
            if annotations.insert(key.clone(), value).is_some() {
                return Err(self.err(format!("duplicate annotation `@{key}`")));
            }
        }

        let effect = match self.next() {
            Some(Tok::Ident(s)) if s == "permit" => Effect::Permit,
            Some(Tok::Ident(s)) if s == "forbid" => Effect::Forbid,
            _ => return Err(self.err("expected `permit` or `forbid`")),
        };

        self.expect(Tok::LParen)?;
        let principal = self.principal_constraint()?;
        self.expect(Tok::Comma)?;
        let action = self.action_constraint()?;
        self.expect(Tok::Comma)?;
        let resource = self.resource_constraint()?;
        self.expect(Tok::RParen)?;

        let mut conditions = Vec::new();
        loop {
            let kind = if self.eat_ident("when") {
                ConditionKind::When
            } else if self.eat_ident("unless") {
                ConditionKind::Unless
            } else {
                break;
            };
            self.expect(Tok::LBrace)?;
            let body = self.expr()?;
            self.expect(Tok::RBrace)?;
            conditions.push(Condition { kind, body });
        }

        self.expect(Tok::Semi)?;

        Ok(Policy {
            annotations,
            effect,
            principal,
            action,
            resource,
            conditions,
        })
    }

    fn principal_constraint(&mut self) -> Result<PrincipalConstraint, PolicyError> {
        self.expect_ident("principal")?;
        if matches!(self.peek(), Some(Tok::EqEq)) {
            self.pos += 1;
            Ok(PrincipalConstraint::Eq(self.scope_entity(SlotId::Principal)?))
        } else if self.eat_ident("in") {
            Ok(PrincipalConstraint::In(self.scope_entity(SlotId::Principal)?))
        } else {
            Ok(PrincipalConstraint::Any)
        }
    }

    fn action_constraint(&mut self) -> Result<ActionConstraint, PolicyError> {
        self.expect_ident("action")?;
        if matches!(self.peek(), Some(Tok::EqEq)) {
            self.pos += 1;
            Ok(ActionConstraint::Eq(self.entity_uid()?))
        } else if self.eat_ident("in") {
            if matches!(self.peek(), Some(Tok::LBracket)) {
                self.pos += 1;
                let mut uids = vec![self.entity_uid()?];
                while matches!(self.peek(), Some(Tok::Comma)) {
                    self.pos += 1;
                    uids.push(self.entity_uid()?);
                }
                self.expect(Tok::RBracket)?;
                Ok(ActionConstraint::In(uids))
            } else {
                Ok(ActionConstraint::In(vec![self.entity_uid()?]))
            }
        } else {
            Ok(ActionConstraint::Any)
        }
    }

    fn resource_constraint(&mut self) -> Result<ResourceConstraint, PolicyError> {
        self.expect_ident("resource")?;
        if matches!(self.peek(), Some(Tok::EqEq)) {
            self.pos += 1;
            Ok(ResourceConstraint::Eq(self.scope_entity(SlotId::Resource)?))
        } else if self.eat_ident("in") {
            Ok(ResourceConstraint::In(self.scope_entity(SlotId::Resource)?))
        } else {
            Ok(ResourceConstraint::Any)
        }
    }

    fn scope_entity(&mut self, expected: SlotId) -> Result<ScopeEntity, PolicyError> {
        if let Some(Tok::Slot(name)) = self.peek() {
            let name = name.clone();
            let at = self.offset();
            self.pos += 1;
            if !self.allow_slots {
                return Err(err_at(at, "slots are only allowed in templates"));
            }
            let slot = match name.as_str() {
                "principal" => SlotId::Principal,
                "resource" => SlotId::Resource,
                other => return Err(err_at(at, format!("unknown slot `?{other}`"))),
            };
            if slot != expected {
                return Err(err_at(
                    at,
                    format!("`?{name}` cannot appear in this scope position"),
                ));
            }
            return Ok(ScopeEntity::Slot(slot));
        }
        Ok(ScopeEntity::Uid(self.entity_uid()?))
    }

    fn entity_uid(&mut self) -> Result<EntityUid, PolicyError> {
        let at = self.offset();
        let mut path = self.any_ident()?;
        loop {
            self.expect(Tok::DoubleColon)?;
            match self.peek() {
                Some(Tok::Str(_)) => {
                    let Some(Tok::Str(id)) = self.next() else {
                        unreachable!()
                    };
                    return EntityUid::new(path, id)
                        .map_err(|e| err_at(at, format!("invalid entity uid: {e}")));
                }
                Some(Tok::Ident(_)) => {
                    let Some(Tok::Ident(seg)) = self.next() else {
                        unreachable!()
                    };
                    path.push_str("::");
                    path.push_str(&seg);
                }
                _ => return Err(self.err("expected an identifier or quoted id after `::`")),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, PolicyError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Tok::OrOr)) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, PolicyError> {
        let mut left = self.rel_expr()?;
        while matches!(self.peek(), Some(Tok::AndAnd)) {
            self.pos += 1;
            let right = self.rel_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn rel_op(&self) -> Option<BinaryOp> {
        match self.peek() {
            Some(Tok::EqEq) => Some(BinaryOp::Eq),
            Some(Tok::NotEq) => Some(BinaryOp::NotEq),
            Some(Tok::Lt) => Some(BinaryOp::Less),
            Some(Tok::Le) => Some(BinaryOp::LessEq),
            Some(Tok::Gt) => Some(BinaryOp::Greater),
            Some(Tok::Ge) => Some(BinaryOp::GreaterEq),
            _ => None,
        }
    }

    fn rel_expr(&mut self) -> Result<Expr, PolicyError> {
        let left = self.unary()?;
        if let Some(op) = self.rel_op() {
            self.pos += 1;
            let right = self.unary()?;
            if self.rel_op().is_some() {
                return Err(self.err("comparison operators cannot be chained"));
            }
            return Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == "in") {
            self.pos += 1;
            let right = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::In,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == "has") {
            self.pos += 1;
            let attr = match self.next() {
                Some(Tok::Ident(s)) => s,
                Some(Tok::Str(s)) => s,
                _ => return Err(self.err("expected an attribute name after `has`")),
            };
            return Ok(Expr::HasAttr {
                expr: Box::new(left),
                attr,
            });
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, PolicyError> {
        if matches!(self.peek(), Some(Tok::Bang)) {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.member()
    }

    fn member(&mut self) -> Result<Expr, PolicyError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = self.any_ident()?;
                    if matches!(self.peek(), Some(Tok::LParen)) {
                        let method = match name.as_str() {
                            "contains" => SetMethod::Contains,
                            "containsAll" => SetMethod::ContainsAll,
                            "containsAny" => SetMethod::ContainsAny,
                            other => {
                                return Err(self.err(format!("unknown method `{other}`")));
                            }
                        };
                        self.pos += 1;
                        let arg = self.expr()?;
                        self.expect(Tok::RParen)?;
                        expr = Expr::Method {
                            method,
                            receiver: Box::new(expr),
                            arg: Box::new(arg),
                        };
                    } else {
                        expr = Expr::GetAttr {
                            expr: Box::new(expr),
                            attr: name,
                        };
                    }
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let attr = match self.next() {
                        Some(Tok::Str(s)) => s,
                        _ => return Err(self.err("expected a quoted attribute name")),
                    };
                    self.expect(Tok::RBracket)?;
                    expr = Expr::GetAttr {
                        expr: Box::new(expr),
                        attr,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, PolicyError> {
        match self.peek() {
            Some(Tok::Ident(s)) => match s.as_str() {
                "true" => {
                    self.pos += 1;
                    Ok(Expr::Lit(Value::Bool(true)))
                }
                "false" => {
                    self.pos += 1;
                    Ok(Expr::Lit(Value::Bool(false)))
                }
                "principal" => {
                    self.pos += 1;
                    Ok(Expr::Var(Var::Principal))
                }
                "action" => {
                    self.pos += 1;
                    Ok(Expr::Var(Var::Action))
                }
                "resource" => {
                    self.pos += 1;
                    Ok(Expr::Var(Var::Resource))
                }
                "context" => {
                    self.pos += 1;
                    Ok(Expr::Var(Var::Context))
                }
                other => {
                    if matches!(self.peek2(), Some(Tok::DoubleColon)) {
                        Ok(Expr::Lit(Value::Entity(self.entity_uid()?)))
                    } else {
                        Err(self.err(format!("unknown identifier `{other}`")))
                    }
                }
            },
            Some(Tok::Int(_)) => {
                let Some(Tok::Int(n)) = self.next() else {
                    unreachable!()
                };
                Ok(Expr::Lit(Value::Long(n)))
            }
            Some(Tok::Minus) => {
                self.pos += 1;
                match self.next() {
                    Some(Tok::Int(n)) => Ok(Expr::Lit(Value::Long(-n))),
                    _ => Err(self.err("expected an integer after `-`")),
                }
            }
            Some(Tok::Str(_)) => {
                let Some(Tok::Str(s)) = self.next() else {
                    unreachable!()
                };
                Ok(Expr::Lit(Value::String(s)))
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Tok::RBracket)) {
                    items.push(self.expr()?);
                    while matches!(self.peek(), Some(Tok::Comma)) {
                        self.pos += 1;
                        items.push(self.expr()?);
                    }
                }
                self.expect(Tok::RBracket)?;
                Ok(Expr::Set(items))
            }
            Some(Tok::LBrace) => {
                self.pos += 1;
                let mut fields: Vec<(String, Expr)> = Vec::new();
                if !matches!(self.peek(), Some(Tok::RBrace)) {
                    loop {
                        let key = match self.next() {
                            Some(Tok::Ident(s)) => s,
                            Some(Tok::Str(s)) => s,
                            _ => return Err(self.err("expected a record key")),
                        };
                        if fields.iter().any(|(k, _)| *k == key) {
                            return Err(self.err(format!("duplicate record key `{key}`")));
                        }
                        self.expect(Tok::Colon)?;
                        let value = self.expr()?;
                        fields.push((key, value));
                        if matches!(self.peek(), Some(Tok::Comma)) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBrace)?;
                Ok(Expr::Record(fields))
            }
            Some(other) => Err(self.err(format!("expected an expression, found {other}"))),
            None => Err(self.err("expected an expression, found end of input")),
        }
    }
}

/// Parse a document of zero or more policies.
pub(crate) fn parse_policies(text: &str, allow_slots: bool) -> Result<Vec<Policy>, PolicyError> {
    let mut parser = Parser::new(text, allow_slots)?;
    let mut policies = Vec::new();
    while !parser.at_end() {
        policies.push(parser.policy()?);
    }
    Ok(policies)
}

/// Parse exactly one policy.
pub(crate) fn parse_single(text: &str, allow_slots: bool) -> Result<Policy, PolicyError> {
    let mut policies = parse_policies(text, allow_slots)?;
    match policies.len() {
        1 => Ok(policies.pop().expect("length checked")),
        0 => Err(PolicyError::ParseError("expected a policy".to_string())),
        n => Err(PolicyError::ParseError(format!(
            "expected a single policy, found {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        bare = { "permit(principal, action, resource);" },
        eq_scope = { r#"permit(principal == User::"alice", action == Action::"view", resource == Photo::"trip.jpg");"# },
        in_scope = { r#"permit(principal in Group::"admins", action, resource in Folder::"shared");"# },
        action_list = { r#"forbid(principal, action in [Action::"edit", Action::"delete"], resource);"# },
        namespaced = { r#"permit(principal == App::User::"alice", action == App::Action::"view", resource);"# },
        when_clause = { r#"permit(principal, action, resource) when { context.mfa == true };"# },
        unless_clause = { r#"permit(principal, action, resource) unless { principal in Group::"banned" };"# },
        both_clauses = { r#"permit(principal, action, resource) when { context.level >= 2 } unless { context.revoked == true };"# },
        comments = { "// header\npermit(principal, action, resource); // trailing" },
        has_check = { r#"permit(principal, action, resource) when { principal has clearance && principal.clearance >= 3 };"# },
        set_literal = { r#"permit(principal, action, resource) when { [1, 2, 3].contains(context.level) };"# },
        record_literal = { r#"permit(principal, action, resource) when { context.tags == {env: "prod", "region": "eu"} };"# },
        bracket_access = { r#"permit(principal, action, resource) when { context["strange key"] == 1 };"# },
        negative_long = { r#"permit(principal, action, resource) when { context.offset > -5 };"# },
    )]
    fn test_parse_ok(text: &str) {
        let policies = parse_policies(text, false).unwrap();
        assert_eq!(policies.len(), 1);
    }

    #[test]
    fn test_parse_multiple_policies() {
        let text = r#"
            permit(principal, action, resource);
            forbid(principal == User::"mallory", action, resource);
        "#;
        let policies = parse_policies(text, false).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].effect, Effect::Permit);
        assert_eq!(policies[1].effect, Effect::Forbid);
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(parse_policies("", false).unwrap().is_empty());
        assert!(parse_policies("  // just a comment\n", false).unwrap().is_empty());
    }

    #[parameterized(
        missing_semi = { "permit(principal, action, resource)" },
        swapped_scope = { "permit(action, principal, resource);" },
        chained_comparison = { "permit(principal, action, resource) when { 1 < 2 < 3 };" },
        unknown_method = { r#"permit(principal, action, resource) when { context.tags.size(1) };"# },
        lone_equals = { "permit(principal = User::\"a\", action, resource);" },
        unterminated_string = { r#"permit(principal == User::"alice, action, resource);"# },
        unknown_identifier = { "permit(principal, action, resource) when { banana };" },
        bad_escape = { r#"permit(principal == User::"a\q", action, resource);"# },
        float_literal = { "permit(principal, action, resource) when { context.v == 1.5 };" },
        duplicate_record_key = { "permit(principal, action, resource) when { context.x == {a: 1, a: 2} };" },
        empty_action_list = { "permit(principal, action in [], resource);" },
        duplicate_annotation = { r#"@id("a") @id("b") permit(principal, action, resource);"# },
    )]
    fn test_parse_errors(text: &str) {
        assert!(matches!(
            parse_policies(text, false),
            Err(PolicyError::ParseError(_))
        ));
    }

    #[test]
    fn test_slots_rejected_in_concrete_policies() {
        let err = parse_policies(
            r#"permit(principal == ?principal, action, resource);"#,
            false,
        );
        assert!(matches!(err, Err(PolicyError::ParseError(_))));
    }

    #[test]
    fn test_slots_allowed_in_templates() {
        let policies = parse_policies(
            r#"permit(principal == ?principal, action, resource == ?resource);"#,
            true,
        )
        .unwrap();
        assert_eq!(policies[0].slots().len(), 2);
    }

    #[test]
    fn test_slot_position_enforced() {
        let err = parse_policies(
            r#"permit(principal == ?resource, action, resource);"#,
            true,
        );
        assert!(matches!(err, Err(PolicyError::ParseError(_))));
    }

    #[test]
    fn test_unknown_slot_name() {
        let err = parse_policies(r#"permit(principal == ?user, action, resource);"#, true);
        assert!(matches!(err, Err(PolicyError::ParseError(_))));
    }

    #[test]
    fn test_action_slot_not_supported() {
        let err = parse_policies(r#"permit(principal, action == ?action, resource);"#, true);
        assert!(matches!(err, Err(PolicyError::ParseError(_))));
    }

    #[test]
    fn test_error_reports_offset() {
        let err = parse_policies("permit(principal, action, resource)", false).unwrap_err();
        let PolicyError::ParseError(msg) = err else {
            panic!("expected a parse error");
        };
        assert!(msg.contains("offset"), "got: {msg}");
    }

    #[test]
    fn test_parse_single_rejects_extra() {
        let text = "permit(principal, action, resource); permit(principal, action, resource);";
        assert!(parse_single(text, false).is_err());
        assert!(parse_single("", false).is_err());
    }

    #[test]
    fn test_annotations() {
        let policy = parse_single(
            r#"@id("ops-read") @owner("platform") permit(principal, action, resource);"#,
            false,
        )
        .unwrap();
        assert_eq!(policy.id_annotation(), Some("ops-read"));
        assert_eq!(policy.annotations.get("owner").map(String::as_str), Some("platform"));
    }

    #[test]
    fn test_precedence_shape() {
        let policy = parse_single(
            "permit(principal, action, resource) when { context.a == 1 || context.b == 2 && context.c == 3 };",
            false,
        )
        .unwrap();
        // `&&` binds tighter than `||`.
        let Condition { body, .. } = &policy.conditions[0];
        assert!(matches!(body, Expr::Or(_, _)));
    }
}
