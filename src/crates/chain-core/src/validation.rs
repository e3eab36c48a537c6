//! Output schema validation
//!
//! Two schema shapes are accepted on `output_schema`:
//!
//! - **field-style**: `{"sum": "float", "label": "str"}`, where each field must
//!   be present in the output object with a compatible primitive type;
//! - **JSON Schema**: any other object, compiled and checked with the
//!   `jsonschema` crate.
//!
//! Validation returns the list of problems; an empty list means valid. A
//! failed validation demotes an otherwise-successful node result to a
//! failure, and is non-retryable: the same output would fail again.

use serde_json::Value;
use std::collections::HashSet;

/// JSON Schema keywords that disqualify an object from being read as a
/// field-style schema
const SCHEMA_KEYWORDS: &[&str] = &["type", "properties", "required", "items", "$schema", "$ref"];

/// Interpret a schema as field-style (`{field → type-name}`), if it is one
pub fn field_schema(schema: &Value) -> Option<&serde_json::Map<String, Value>> {
    let map = schema.as_object()?;
    if map.is_empty()
        || !map.values().all(|v| v.is_string())
        || map.keys().any(|k| SCHEMA_KEYWORDS.contains(&k.as_str()))
    {
        return None;
    }
    Some(map)
}

/// Whether a value is compatible with a named primitive type
fn type_matches(value: &Value, type_name: &str) -> bool {
    match type_name {
        "int" | "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "float" | "number" => value.is_number(),
        "bool" | "boolean" => value.is_boolean(),
        "str" | "string" => value.is_string(),
        "list" | "array" => value.is_array(),
        "dict" | "object" => value.is_object(),
        "null" | "none" => value.is_null(),
        // Unknown type names accept anything
        _ => true,
    }
}

/// Validate `output` against `schema`, returning the list of errors
pub fn validate_output(schema: &Value, output: &Value) -> Vec<String> {
    if let Some(fields) = field_schema(schema) {
        let mut errors = Vec::new();
        let Some(object) = output.as_object() else {
            return vec![format!(
                "output is not an object (found {})",
                type_name_of(output)
            )];
        };
        for (field, expected) in fields {
            let expected = expected.as_str().expect("field_schema checked values");
            match object.get(field) {
                None => errors.push(format!("missing output field '{field}'")),
                Some(value) if !type_matches(value, expected) => errors.push(format!(
                    "output field '{field}' expected {expected}, found {}",
                    type_name_of(value)
                )),
                Some(_) => {}
            }
        }
        return errors;
    }

    // Anything else is treated as a JSON Schema document
    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(e) => return vec![format!("invalid output schema: {e}")],
    };
    let result = match compiled.validate(output) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{} (at {})", e, e.instance_path))
            .collect(),
    };
    result
}

fn type_name_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Field names declared by a field-style schema (used for schema-alignment
/// warnings)
pub fn declared_fields(schema: &Value) -> Option<HashSet<&str>> {
    field_schema(schema).map(|map| map.keys().map(String::as_str).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_schema_detection() {
        assert!(field_schema(&json!({"sum": "float"})).is_some());
        assert!(field_schema(&json!({"type": "object"})).is_none());
        assert!(field_schema(&json!({"a": 1})).is_none());
        assert!(field_schema(&json!({})).is_none());
        assert!(field_schema(&json!("float")).is_none());
    }

    #[test]
    fn test_field_style_valid() {
        let schema = json!({"sum": "float", "label": "str"});
        let output = json!({"sum": 6.0, "label": "totals", "extra": true});
        assert!(validate_output(&schema, &output).is_empty());

        // int satisfies float
        assert!(validate_output(&schema, &json!({"sum": 6, "label": "x"})).is_empty());
    }

    #[test]
    fn test_field_style_missing_and_mismatched() {
        let schema = json!({"sum": "float", "label": "str"});
        let errors = validate_output(&schema, &json!({"sum": "six"}));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("expected float")));
        assert!(errors.iter().any(|e| e.contains("missing output field 'label'")));
    }

    #[test]
    fn test_field_style_non_object_output() {
        let schema = json!({"sum": "float"});
        let errors = validate_output(&schema, &json!([1, 2]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not an object"));
    }

    #[test]
    fn test_json_schema_document() {
        let schema = json!({
            "type": "object",
            "properties": {"count": {"type": "integer", "minimum": 0}},
            "required": ["count"]
        });
        assert!(validate_output(&schema, &json!({"count": 3})).is_empty());

        let errors = validate_output(&schema, &json!({"count": -1}));
        assert!(!errors.is_empty());

        let errors = validate_output(&schema, &json!({}));
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_invalid_schema_reports_one_error() {
        let schema = json!({"type": "definitely-not-a-type"});
        let errors = validate_output(&schema, &json!({}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid output schema"));
    }

    #[test]
    fn test_unknown_type_name_accepts_anything() {
        let schema = json!({"payload": "any"});
        assert!(validate_output(&schema, &json!({"payload": [1, {"x": 2}]})).is_empty());
    }
}
