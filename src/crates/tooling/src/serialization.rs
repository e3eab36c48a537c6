//! Serialization utilities
//!
//! Provides stable JSON serialization and deterministic hashing. The engine
//! builds cache keys from these helpers, so the output must not depend on
//! map iteration order.

use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Generate a stable hash for a value
///
/// # Example
///
/// ```rust
/// use tooling::serialization::generate_hash;
///
/// assert_eq!(generate_hash(&"hello"), generate_hash(&"hello"));
/// assert_ne!(generate_hash(&"hello"), generate_hash(&"world"));
/// ```
pub fn generate_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Generate a stable hash from a JSON value
///
/// Object keys are sorted first so that logically equal documents hash
/// identically.
///
/// # Example
///
/// ```rust
/// use tooling::serialization::generate_json_hash;
/// use serde_json::json;
///
/// let val1 = json!({"b": 2, "a": 1});
/// let val2 = json!({"a": 1, "b": 2});
/// assert_eq!(generate_json_hash(&val1), generate_json_hash(&val2));
/// ```
pub fn generate_json_hash(value: &Value) -> u64 {
    match stable_json_string(value) {
        Ok(stable) => generate_hash(&stable),
        Err(_) => generate_hash(&value.to_string()),
    }
}

/// Serialize a JSON value to a stable string representation
///
/// Ensures deterministic output by sorting object keys alphabetically at
/// every nesting level.
///
/// # Example
///
/// ```rust
/// use tooling::serialization::stable_json_string;
/// use serde_json::json;
///
/// let val = json!({"b": 2, "a": 1, "c": 3});
/// assert_eq!(stable_json_string(&val).unwrap(), r#"{"a":1,"b":2,"c":3}"#);
/// ```
pub fn stable_json_string(value: &Value) -> Result<String> {
    let normalized = normalize_json(value.clone());
    serde_json::to_string(&normalized).map_err(|e| e.into())
}

/// Serialize any serializable value to a stable JSON string
pub fn to_stable_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value = serde_json::to_value(value)?;
    stable_json_string(&json_value)
}

/// Recursively sort all object keys alphabetically
fn normalize_json(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k, normalize_json(v));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(normalize_json).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stable_string_sorts_nested_keys() {
        let val = json!({"z": {"b": 2, "a": 1}, "a": [{"y": 1, "x": 2}]});
        let stable = stable_json_string(&val).unwrap();
        assert_eq!(stable, r#"{"a":[{"x":2,"y":1}],"z":{"a":1,"b":2}}"#);
    }

    #[test]
    fn test_hash_is_order_insensitive() {
        let val1 = json!({"b": [1, 2], "a": {"y": 2, "x": 1}});
        let val2 = json!({"a": {"x": 1, "y": 2}, "b": [1, 2]});
        assert_eq!(generate_json_hash(&val1), generate_json_hash(&val2));
    }

    #[test]
    fn test_hash_differs_for_different_content() {
        assert_ne!(
            generate_json_hash(&json!({"a": 1})),
            generate_json_hash(&json!({"a": 2}))
        );
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            generate_json_hash(&json!([1, 2])),
            generate_json_hash(&json!([2, 1]))
        );
    }

    #[test]
    fn test_to_stable_json_roundtrip() {
        #[derive(Serialize)]
        struct Payload {
            b: u32,
            a: u32,
        }
        let stable = to_stable_json(&Payload { b: 2, a: 1 }).unwrap();
        assert_eq!(stable, r#"{"a":1,"b":2}"#);
    }
}
