//! Dotted-path lookup and construction.

use serde_json::Value;

use super::{Map, MAX_DEPTH};

/// Look up a dotted path such as `a.b.0.c`.
///
/// An empty path returns the root. Numeric segments index into arrays.
pub fn reach<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Build a nested single-key object from a dotted path.
///
/// `build_path("a.b.c", 5)` yields `{a:{b:{c:5}}}`. Runs of dots collapse.
/// Returns `None` when the path has no segments or more than [`MAX_DEPTH`].
pub fn build_path(path: &str, value: Value) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() || segments.len() > MAX_DEPTH {
        return None;
    }

    Some(segments.iter().rev().fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert((*segment).to_string(), inner);
        Value::Object(map)
    }))
}

/// Merge `patch` into `target`, recursing through objects.
///
/// Non-object values in `patch` replace whatever is in `target`.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reach_nested() {
        let v = json!({"a": {"b": {"c": 5}}, "l": [1, {"x": 2}]});
        assert_eq!(reach(&v, "a.b.c"), Some(&json!(5)));
        assert_eq!(reach(&v, "a.b"), Some(&json!({"c": 5})));
        assert_eq!(reach(&v, "l.1.x"), Some(&json!(2)));
        assert_eq!(reach(&v, "a.zed"), None);
        assert_eq!(reach(&v, "l.9"), None);
    }

    #[test]
    fn test_reach_empty_path_is_root() {
        let v = json!({"a": 1});
        assert_eq!(reach(&v, ""), Some(&v));
    }

    #[test]
    fn test_build_path() {
        assert_eq!(
            build_path("a.b.c", json!(5)),
            Some(json!({"a": {"b": {"c": 5}}}))
        );
        assert_eq!(build_path("a..b", json!(1)), Some(json!({"a": {"b": 1}})));
        assert_eq!(build_path("...", json!(1)), None);
    }

    #[test]
    fn test_build_path_too_deep() {
        let path = vec!["a"; MAX_DEPTH + 1].join(".");
        assert_eq!(build_path(&path, json!(1)), None);
        let path = vec!["a"; MAX_DEPTH].join(".");
        assert!(build_path(&path, json!(1)).is_some());
    }

    #[test]
    fn test_deep_merge() {
        let mut v = json!({"a": {"b": 1, "c": 2}, "d": 1});
        deep_merge(&mut v, json!({"a": {"c": 3, "e": 4}, "d": {"x": 1}}));
        assert_eq!(v, json!({"a": {"b": 1, "c": 3, "e": 4}, "d": {"x": 1}}));
    }
}
