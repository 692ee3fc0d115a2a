//! Entity identifiers in the canonical `Namespace::Type::"id"` form.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PolicyError;

/// One or more `::`-separated identifiers followed by a quoted id.
static UID_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:[A-Za-z_][A-Za-z0-9_]*::)+"(?:[^"\\]|\\.)*"$"#).unwrap());

/// An entity type path: identifiers joined by `::`.
static TYPE_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:::[A-Za-z_][A-Za-z0-9_]*)*$").unwrap());

/// A globally unique entity reference, e.g. `User::"alice"` or
/// `App::Group::"admins"`.
///
/// The type name is the full path up to the quoted id. Instances are
/// immutable once constructed; malformed input is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct EntityUid {
    #[serde(rename = "type")]
    type_name: String,
    id: String,
}

impl EntityUid {
    /// Construct from a type path and a raw (unquoted, unescaped) id.
    pub fn new(
        type_name: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let type_name = type_name.into();
        if !TYPE_FORM.is_match(&type_name) {
            return Err(PolicyError::InvalidEntityUid(format!(
                "`{type_name}` is not a valid entity type name"
            )));
        }
        Ok(EntityUid {
            type_name,
            id: id.into(),
        })
    }

    /// The full type path, e.g. `App::User`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The raw id, without quoting or escapes.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for EntityUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}::\"{}\"", self.type_name, escape(&self.id))
    }
}

impl FromStr for EntityUid {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !UID_FORM.is_match(s) {
            return Err(PolicyError::InvalidEntityUid(format!(
                "`{s}` does not match the form `Type::\"id\"`"
            )));
        }
        // The type path contains no quotes, so the first quote opens the id.
        let quote = s.find('"').expect("regex guarantees a quoted id");
        let type_name = s[..quote]
            .strip_suffix("::")
            .expect("regex guarantees a `::` before the id")
            .to_string();
        let raw = &s[quote + 1..s.len() - 1];
        let id = unescape(raw)
            .map_err(|e| PolicyError::InvalidEntityUid(format!("`{s}`: {e}")))?;
        Ok(EntityUid { type_name, id })
    }
}

/// Escape an id for rendering inside double quotes.
pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolve the escape sequences of a quoted id body.
pub(crate) fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => return Err(format!("unsupported escape `\\{other}`")),
            None => return Err("trailing backslash".to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { r#"User::"alice""#, "User", "alice" },
        namespaced = { r#"App::User::"alice""#, "App::User", "alice" },
        deep_namespace = { r#"App::Admin::Action::"wipe""#, "App::Admin::Action", "wipe" },
        empty_id = { r#"Group::"""#, "Group", "" },
        escaped_quote = { r#"Doc::"a\"b""#, "Doc", "a\"b" },
    )]
    fn test_parse_valid(input: &str, type_name: &str, id: &str) {
        let uid: EntityUid = input.parse().unwrap();
        assert_eq!(uid.type_name(), type_name);
        assert_eq!(uid.id(), id);
    }

    #[parameterized(
        no_quotes = { "User::alice" },
        no_type = { r#""alice""# },
        empty = { "" },
        bad_segment = { r#"User::9Group::"x""# },
        trailing = { r#"User::"alice"x"# },
        lone_colons = { r#"::"alice""# },
        unterminated = { r#"User::"alice"# },
    )]
    fn test_parse_invalid(input: &str) {
        assert!(matches!(
            input.parse::<EntityUid>(),
            Err(PolicyError::InvalidEntityUid(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for raw in [r#"User::"alice""#, r#"App::Group::"dev ops""#, r#"Doc::"a\\b""#] {
            let uid: EntityUid = raw.parse().unwrap();
            let again: EntityUid = uid.to_string().parse().unwrap();
            assert_eq!(uid, again);
        }
    }

    #[test]
    fn test_display_escapes_id() {
        let uid = EntityUid::new("Doc", "a\"b\\c").unwrap();
        assert_eq!(uid.to_string(), r#"Doc::"a\"b\\c""#);
    }

    #[test]
    fn test_new_rejects_bad_type() {
        assert!(EntityUid::new("User::", "alice").is_err());
        assert!(EntityUid::new("", "alice").is_err());
        assert!(EntityUid::new("Us er", "alice").is_err());
    }

    #[test]
    fn test_serialization() {
        let uid = EntityUid::new("User", "alice").unwrap();
        let json = serde_json::to_value(&uid).unwrap();
        assert_eq!(json, serde_json::json!({"type": "User", "id": "alice"}));
        let back: EntityUid = serde_json::from_value(json).unwrap();
        assert_eq!(uid, back);
    }

    #[test]
    fn test_ordering_is_stable() {
        let a: EntityUid = r#"Group::"admins""#.parse().unwrap();
        let b: EntityUid = r#"User::"alice""#.parse().unwrap();
        assert!(a < b);
    }
}
