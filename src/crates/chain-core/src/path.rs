//! Dotted-path navigation over JSON values
//!
//! The path grammar is deliberately tiny: segments separated by `.`, where
//! a segment is an identifier (object key) or an unsigned integer (array
//! index). The empty path and `"."` yield the whole value. This is the only
//! path syntax used anywhere in the engine: input mappings, templating,
//! loop item sources, and nested-workflow output exposure all share it.

use std::fmt;

/// Failure to resolve a path against a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    /// The full path being resolved
    pub path: String,
    /// The segment resolution failed at
    pub segment: String,
    /// What went wrong
    pub reason: String,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot resolve path '{}' at segment '{}': {}",
            self.path, self.segment, self.reason
        )
    }
}

impl std::error::Error for PathError {}

/// Resolve a dotted `path` against `data`
///
/// # Examples
///
/// ```rust
/// use chain_core::path::resolve_path;
/// use serde_json::json;
///
/// let data = json!({"items": [{"name": "a"}, {"name": "b"}]});
/// assert_eq!(resolve_path(&data, "items.1.name").unwrap(), &json!("b"));
/// assert_eq!(resolve_path(&data, "").unwrap(), &data);
/// assert_eq!(resolve_path(&data, ".").unwrap(), &data);
/// assert!(resolve_path(&data, "items.5").is_err());
/// ```
pub fn resolve_path<'a>(
    data: &'a serde_json::Value,
    path: &str,
) -> Result<&'a serde_json::Value, PathError> {
    if path.is_empty() || path == "." {
        return Ok(data);
    }

    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment).ok_or_else(|| PathError {
                path: path.to_string(),
                segment: segment.to_string(),
                reason: "key not found".to_string(),
            })?,
            serde_json::Value::Array(arr) => {
                let index: usize = segment.parse().map_err(|_| PathError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    reason: "array index is not an integer".to_string(),
                })?;
                arr.get(index).ok_or_else(|| PathError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    reason: format!("index out of bounds (len {})", arr.len()),
                })?
            }
            other => {
                return Err(PathError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    reason: format!(
                        "cannot index into {}",
                        match other {
                            serde_json::Value::Null => "null",
                            serde_json::Value::Bool(_) => "a boolean",
                            serde_json::Value::Number(_) => "a number",
                            serde_json::Value::String(_) => "a string",
                            _ => "this value",
                        }
                    ),
                })
            }
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_whole_value_paths() {
        let data = json!({"a": 1});
        assert_eq!(resolve_path(&data, "").unwrap(), &data);
        assert_eq!(resolve_path(&data, ".").unwrap(), &data);
    }

    #[test]
    fn test_object_and_array_navigation() {
        let data = json!({"rows": [{"cells": [10, 20]}]});
        assert_eq!(resolve_path(&data, "rows.0.cells.1").unwrap(), &json!(20));
    }

    #[test]
    fn test_missing_key() {
        let data = json!({"a": 1});
        let err = resolve_path(&data, "b").unwrap_err();
        assert_eq!(err.segment, "b");
        assert!(err.reason.contains("key not found"));
    }

    #[test]
    fn test_bad_index() {
        let data = json!([1, 2, 3]);
        assert!(resolve_path(&data, "x").is_err());
        assert!(resolve_path(&data, "3").is_err());
    }

    #[test]
    fn test_scalar_is_terminal() {
        let data = json!({"a": 42});
        let err = resolve_path(&data, "a.b").unwrap_err();
        assert!(err.reason.contains("cannot index into a number"));
    }

    proptest! {
        #[test]
        fn prop_resolved_index_matches_direct_access(values in proptest::collection::vec(0i64..1000, 1..20)) {
            let data = json!({ "items": values.clone() });
            for (idx, expected) in values.iter().enumerate() {
                let resolved = resolve_path(&data, &format!("items.{idx}")).unwrap();
                prop_assert_eq!(resolved, &json!(*expected));
            }
        }

        #[test]
        fn prop_out_of_bounds_always_errors(len in 0usize..10, over in 0usize..5) {
            let data = json!(vec![0; len]);
            let idx = len + over;
            prop_assert!(resolve_path(&data, &idx.to_string()).is_err());
        }
    }
}
