//! Message patterns: flat key/value sets matched against messages.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::HostError;
use crate::value::{self, Map};

/// A message pattern such as `role:seneca,stats:true`.
///
/// Keys are kept sorted so two patterns with the same pairs compare equal
/// regardless of the order they were written in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pattern {
    pairs: BTreeMap<String, String>,
}

impl Pattern {
    /// Parse pattern text, e.g. `sys:repl,echo:true`.
    pub fn parse(text: &str) -> Result<Self, HostError> {
        let value = value::parse(text)
            .map_err(|e| HostError::new("invalid_pattern", format!("{}: {}", text, e)))?;
        Self::from_value(&value)
            .ok_or_else(|| HostError::new("invalid_pattern", format!("not an object: {}", text)))
    }

    /// Build a pattern from the scalar fields of an object.
    ///
    /// Nested objects and arrays are ignored. Returns `None` for anything
    /// other than an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let pairs = map
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|text| (k.clone(), text)))
            .collect();
        Some(Self { pairs })
    }

    /// Whether every pair of this pattern is present in `message`.
    pub fn matches(&self, message: &Value) -> bool {
        let Some(map) = message.as_object() else {
            return false;
        };
        self.pairs.iter().all(|(key, expected)| {
            map.get(key)
                .and_then(scalar_text)
                .is_some_and(|actual| &actual == expected)
        })
    }

    /// Whether this pattern includes every pair of `narrow`.
    pub fn contains(&self, narrow: &Pattern) -> bool {
        narrow
            .pairs
            .iter()
            .all(|(key, value)| self.pairs.get(key) == Some(value))
    }

    /// Number of pairs; more pairs means more specific.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let map: Map = self
            .pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        write!(f, "{}", text.join(","))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display_sorted() {
        let p = Pattern::parse("sys:repl,echo:true").unwrap();
        assert_eq!(p.to_string(), "echo:true,sys:repl");
        assert_eq!(p, Pattern::parse("echo:true sys:repl").unwrap());
    }

    #[test]
    fn test_parse_rejects_scalar() {
        assert!(Pattern::parse("1 + 2").is_err());
    }

    #[test]
    fn test_matches_stringifies_scalars() {
        let p = Pattern::parse("role:seneca,stats:true").unwrap();
        assert!(p.matches(&json!({"role": "seneca", "stats": true, "summary": false})));
        assert!(p.matches(&json!({"role": "seneca", "stats": "true"})));
        assert!(!p.matches(&json!({"role": "seneca"})));
        assert!(!p.matches(&json!([1])));
    }

    #[test]
    fn test_contains() {
        let p = Pattern::parse("sys:repl,send:cmd").unwrap();
        assert!(p.contains(&Pattern::parse("sys:repl").unwrap()));
        assert!(p.contains(&Pattern::default()));
        assert!(!p.contains(&Pattern::parse("sys:other").unwrap()));
    }
}
