//! Scope expressions and the visibility rule.
//!
//! A `scopes` annotation is a string or a list of strings; each entry is one of
//!
//! - `s`       plain, matches when `s` is provided
//! - `+s`      additive, matches like plain and adds `s` downstream
//! - `-s`      subtractive, matches like plain and removes `s` downstream
//! - `!s`      veto, hides the property whenever `s` is provided
//! - `a^b^..`  compound, matches when every part is provided, or when the
//!             literal `a^b^..` is
//!
//! Entries are parsed once into [`ScopeToken`]s; [`ScopeRule::resolve`] then
//! answers "visible?" and "with which scopes below?" in one go.
use std::fmt;

use indexmap::IndexSet;
use serde_json::Value;

use crate::model::{Annotations, Property, SCOPES_ANNOTATION};

// ————————————————————————————————————————————————————————————————————————————
// TOKENS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Plain,
    Additive,
    Subtractive,
    Veto,
    Compound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeToken {
    pub kind: ScopeKind,
    /// Parts that must all be provided for the token to match. Vetoes keep their
    /// body verbatim as a single part.
    pub tokens: Vec<String>,
}

impl ScopeToken {
    pub fn parse(raw: &str) -> Self {
        let (kind, body) = match raw.as_bytes().first() {
            Some(b'+') => (ScopeKind::Additive, &raw[1..]),
            Some(b'-') => (ScopeKind::Subtractive, &raw[1..]),
            Some(b'!') => (ScopeKind::Veto, &raw[1..]),
            _ => (ScopeKind::Plain, raw),
        };
        if kind == ScopeKind::Veto {
            return Self { kind, tokens: vec![body.to_string()] };
        }
        let tokens: Vec<String> = body.split('^').map(str::to_string).collect();
        let kind = if kind == ScopeKind::Plain && tokens.len() > 1 { ScopeKind::Compound } else { kind };
        Self { kind, tokens }
    }

    /// The scope name this token adds or removes downstream.
    pub fn body(&self) -> String {
        self.tokens.join("^")
    }

    pub fn matches(&self, provided: &[String]) -> bool {
        match self.kind {
            ScopeKind::Veto => false,
            ScopeKind::Compound if provided.contains(&self.body()) => true,
            _ => self.tokens.iter().all(|t| provided.contains(t)),
        }
    }

    pub fn vetoes(&self, provided: &[String]) -> bool {
        self.kind == ScopeKind::Veto && self.tokens.iter().any(|t| provided.contains(t))
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ScopeKind::Additive => "+",
            ScopeKind::Subtractive => "-",
            ScopeKind::Veto => "!",
            ScopeKind::Plain | ScopeKind::Compound => "",
        };
        write!(f, "{prefix}{}", self.body())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RULES
// ————————————————————————————————————————————————————————————————————————————

/// Scopes a visible property hands to its nested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downstream {
    /// No `scopes` annotation: pass the caller's list through verbatim.
    Unchanged,
    Scoped(Vec<String>),
}

impl Downstream {
    pub fn resolve<'a>(&'a self, provided: &'a [String]) -> &'a [String] {
        match self {
            Downstream::Unchanged => provided,
            Downstream::Scoped(scopes) => scopes,
        }
    }
}

/// The parsed `scopes` annotation of one property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeRule {
    pub tokens: Vec<ScopeToken>,
}

impl ScopeRule {
    pub fn parse<I, S>(exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { tokens: exprs.into_iter().map(|s| ScopeToken::parse(s.as_ref())).collect() }
    }

    /// `None` when the value is `null`, i.e. no rule at all.
    pub fn from_annotation(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::parse([s])),
            Value::Array(xs) => Some(Self::parse(xs.iter().filter_map(Value::as_str))),
            other => Some(Self::parse([other.to_string()])),
        }
    }

    /// The property's own `scopes` annotation, falling back to the one on its range type.
    pub fn of_property(property: &Property, range_annotations: &Annotations) -> Option<Self> {
        property
            .annotations
            .get(SCOPES_ANNOTATION)
            .or_else(|| range_annotations.get(SCOPES_ANNOTATION))
            .and_then(Self::from_annotation)
    }

    pub fn is_visible(&self, provided: &[String]) -> bool {
        if self.tokens.iter().any(|t| t.vetoes(provided)) {
            return false;
        }
        self.tokens.iter().any(|t| t.matches(provided))
    }

    /// `provided ∪ additive \ subtractive`, first occurrence order, no duplicates.
    pub fn downstream(&self, provided: &[String]) -> Vec<String> {
        let bodies = |kind: ScopeKind| -> Vec<String> {
            self.tokens.iter().filter(|t| t.kind == kind).map(ScopeToken::body).collect()
        };
        let removed = bodies(ScopeKind::Subtractive);
        let all: IndexSet<String> = provided.iter().cloned().chain(bodies(ScopeKind::Additive)).collect();
        all.into_iter().filter(|s| !removed.contains(s)).collect()
    }

    pub fn resolve(&self, provided: &[String]) -> Option<Downstream> {
        self.is_visible(provided).then(|| Downstream::Scoped(self.downstream(provided)))
    }
}

/// Visibility of a property: `None` hides it, otherwise the scopes for its range.
pub fn classify(rule: Option<&ScopeRule>, provided: &[String]) -> Option<Downstream> {
    match rule {
        None => Some(Downstream::Unchanged),
        Some(rule) => rule.resolve(provided),
    }
}

/// In-flight cache key: the provided list as given, order included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey(Vec<String>);

impl ScopeKey {
    pub fn of(provided: &[String]) -> Self {
        Self(provided.to_vec())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(","))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scopes(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_prefixes_and_compounds() {
        let t = ScopeToken::parse("+a");
        assert_eq!((t.kind, t.tokens.clone()), (ScopeKind::Additive, scopes(&["a"])));
        assert_eq!(ScopeToken::parse("-a").kind, ScopeKind::Subtractive);
        assert_eq!(ScopeToken::parse("!a").kind, ScopeKind::Veto);
        let c = ScopeToken::parse("read^admin");
        assert_eq!((c.kind, c.tokens.clone()), (ScopeKind::Compound, scopes(&["read", "admin"])));
        assert_eq!(ScopeToken::parse("!a^b").tokens, scopes(&["a^b"]));
        // unknown prefixes are just part of a plain name
        assert_eq!(ScopeToken::parse("*x").kind, ScopeKind::Plain);
        assert_eq!(ScopeToken::parse("+a^b").to_string(), "+a^b");
    }

    #[test]
    fn single_scope_needs_membership() {
        let rule = ScopeRule::parse(["read"]);
        assert!(!rule.is_visible(&[]));
        assert!(rule.is_visible(&scopes(&["read"])));
        assert!(rule.is_visible(&scopes(&["write", "read"])));
        assert!(!rule.is_visible(&scopes(&["write"])));
    }

    #[test]
    fn list_needs_intersection() {
        let rule = ScopeRule::parse(["read", "list"]);
        assert!(rule.is_visible(&scopes(&["list"])));
        assert!(!rule.is_visible(&scopes(&["admin"])));
    }

    #[test]
    fn veto_wins_over_matches() {
        let rule = ScopeRule::parse(["read", "!list"]);
        assert!(rule.is_visible(&scopes(&["read"])));
        assert!(!rule.is_visible(&scopes(&["read", "list"])));
        assert!(!rule.is_visible(&scopes(&["list"])));
    }

    #[test]
    fn compound_needs_every_part() {
        let rule = ScopeRule::parse(["read^admin"]);
        assert!(!rule.is_visible(&scopes(&["read"])));
        assert!(!rule.is_visible(&scopes(&["admin"])));
        assert!(rule.is_visible(&scopes(&["admin", "read"])));
        assert!(rule.is_visible(&scopes(&["read^admin"])));
        assert!(!rule.is_visible(&scopes(&["admin^read"])));
    }

    #[test]
    fn additive_and_subtractive_shape_downstream() {
        let rule = ScopeRule::parse(["read", "+admin", "-list"]);
        assert_eq!(
            rule.resolve(&scopes(&["read", "list"])),
            Some(Downstream::Scoped(scopes(&["read", "admin"])))
        );
        let rule = ScopeRule::parse(["-read"]);
        assert_eq!(rule.resolve(&scopes(&["read"])), Some(Downstream::Scoped(vec![])));
        // +a matches on its own and is not duplicated
        let rule = ScopeRule::parse(["+a"]);
        assert_eq!(rule.resolve(&scopes(&["a", "b"])), Some(Downstream::Scoped(scopes(&["a", "b"]))));
        assert_eq!(rule.resolve(&scopes(&["b"])), None);
    }

    #[test]
    fn compound_does_not_add_its_parts() {
        let rule = ScopeRule::parse(["x^y", "+z"]);
        assert_eq!(
            rule.resolve(&scopes(&["y", "x"])),
            Some(Downstream::Scoped(scopes(&["y", "x", "z"])))
        );
    }

    #[test]
    fn annotation_values() {
        assert_eq!(ScopeRule::from_annotation(&json!(null)), None);
        assert_eq!(ScopeRule::from_annotation(&json!("read")), Some(ScopeRule::parse(["read"])));
        assert_eq!(
            ScopeRule::from_annotation(&json!(["read", 3, "list"])),
            Some(ScopeRule::parse(["read", "list"]))
        );
        assert_eq!(ScopeRule::from_annotation(&json!(7)), Some(ScopeRule::parse(["7"])));
        // an empty list hides the property for everyone
        let empty = ScopeRule::from_annotation(&json!([])).unwrap();
        assert!(!empty.is_visible(&scopes(&["read"])));
    }

    #[test]
    fn unannotated_is_always_visible_and_unchanged() {
        assert_eq!(classify(None, &[]), Some(Downstream::Unchanged));
        let provided = scopes(&["a"]);
        assert_eq!(Downstream::Unchanged.resolve(&provided), provided.as_slice());
    }

    #[test]
    fn scope_key_is_order_sensitive() {
        assert_ne!(ScopeKey::of(&scopes(&["a", "b"])), ScopeKey::of(&scopes(&["b", "a"])));
        assert_eq!(ScopeKey::of(&scopes(&["a", "b"])).to_string(), "[a,b]");
    }
}
