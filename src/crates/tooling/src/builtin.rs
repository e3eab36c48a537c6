//! Built-in deterministic tools
//!
//! A small set of side-effect-free tools that ship with the workspace. They
//! are useful on their own for plumbing workflows together (summing numeric
//! outputs, merging JSON fragments, pacing) and double as reference
//! implementations of the [`Tool`] contract.

use crate::tool::{tool_descriptor, Tool, ToolError, ToolRegistry, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Adds a list of numbers
///
/// Arguments: `{"numbers": [1, 2, 3]}`. Output: `{"sum": 6.0}`.
/// Integers and floats are accepted; anything else is rejected.
pub struct SumTool;

#[async_trait]
impl Tool for SumTool {
    fn name(&self) -> &str {
        "sum"
    }

    fn description(&self) -> &str {
        "Add a list of numbers and return the total"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "numbers": {
                    "type": "array",
                    "items": {"type": "number"}
                }
            },
            "required": ["numbers"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {"sum": {"type": "number"}},
            "required": ["sum"]
        }))
    }

    async fn run(&self, args: Value) -> ToolResult {
        let numbers = args
            .get("numbers")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::invalid_args("sum", "'numbers' must be an array"))?;

        let mut total = 0.0;
        for (idx, n) in numbers.iter().enumerate() {
            total += n.as_f64().ok_or_else(|| {
                ToolError::invalid_args("sum", format!("element {idx} is not a number"))
            })?;
        }
        Ok(json!({ "sum": total }))
    }
}

/// Sleeps for a number of seconds, then returns how long it slept
///
/// Arguments: `{"seconds": 0.5}`. The delay is cooperative (tokio sleep),
/// so the scheduler keeps running other nodes. Capped at 300 seconds.
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Pause for the given number of seconds"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": {"type": "number", "minimum": 0, "maximum": 300}
            },
            "required": ["seconds"]
        })
    }

    async fn run(&self, args: Value) -> ToolResult {
        let seconds = args
            .get("seconds")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::invalid_args("sleep", "'seconds' must be a number"))?;
        if !(0.0..=300.0).contains(&seconds) {
            return Err(ToolError::invalid_args(
                "sleep",
                "'seconds' must be between 0 and 300",
            ));
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(json!({ "slept": seconds }))
    }
}

/// Shallow-merges two JSON objects
///
/// Arguments: `{"base": {...}, "overlay": {...}}`. Keys present in
/// `overlay` win. Output: `{"merged": {...}}`.
pub struct JsonMergeTool;

#[async_trait]
impl Tool for JsonMergeTool {
    fn name(&self) -> &str {
        "json_merge"
    }

    fn description(&self) -> &str {
        "Shallow-merge two JSON objects, overlay keys winning"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "base": {"type": "object"},
                "overlay": {"type": "object"}
            },
            "required": ["base", "overlay"]
        })
    }

    async fn run(&self, args: Value) -> ToolResult {
        let base = args
            .get("base")
            .and_then(Value::as_object)
            .ok_or_else(|| ToolError::invalid_args("json_merge", "'base' must be an object"))?;
        let overlay = args
            .get("overlay")
            .and_then(Value::as_object)
            .ok_or_else(|| ToolError::invalid_args("json_merge", "'overlay' must be an object"))?;

        let mut merged: Map<String, Value> = base.clone();
        for (key, value) in overlay {
            merged.insert(key.clone(), value.clone());
        }
        Ok(json!({ "merged": Value::Object(merged) }))
    }
}

/// Returns its arguments unchanged
///
/// Handy as a placeholder node and in tests that only care about data flow.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the argument object unchanged"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(&self, args: Value) -> ToolResult {
        Ok(args)
    }
}

/// Register the built-in tools into a registry
///
/// Existing registrations with the same names are left in place (built-ins
/// never override user tools).
pub fn register_builtin_tools(registry: &ToolRegistry) {
    let builtins: Vec<Arc<dyn Tool>> = vec![
        Arc::new(SumTool),
        Arc::new(SleepTool),
        Arc::new(JsonMergeTool),
        Arc::new(EchoTool),
    ];
    for tool in builtins {
        if !registry.contains(tool.name()) {
            // Name was just checked, the only error register() returns
            let _ = registry.register(tool);
        }
    }
}

/// Descriptors for every built-in tool, in function-calling shape
pub fn builtin_descriptors() -> Vec<Value> {
    vec![
        tool_descriptor(&SumTool),
        tool_descriptor(&SleepTool),
        tool_descriptor(&JsonMergeTool),
        tool_descriptor(&EchoTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sum_tool() {
        let out = SumTool.run(json!({"numbers": [1, 2, 3]})).await.unwrap();
        assert_eq!(out, json!({"sum": 6.0}));
    }

    #[tokio::test]
    async fn test_sum_tool_rejects_non_numbers() {
        let err = SumTool
            .run(json!({"numbers": [1, "two"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));

        let err = SumTool.run(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_sleep_tool_bounds() {
        let out = SleepTool.run(json!({"seconds": 0.0})).await.unwrap();
        assert_eq!(out, json!({"slept": 0.0}));

        let err = SleepTool.run(json!({"seconds": 301})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_json_merge_overlay_wins() {
        let out = JsonMergeTool
            .run(json!({
                "base": {"a": 1, "b": 2},
                "overlay": {"b": 3, "c": 4}
            }))
            .await
            .unwrap();
        assert_eq!(out, json!({"merged": {"a": 1, "b": 3, "c": 4}}));
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let payload = json!({"anything": [1, {"nested": true}]});
        let out = EchoTool.run(payload.clone()).await.unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_register_builtins_idempotent() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);
        register_builtin_tools(&registry);
        assert_eq!(
            registry.names(),
            vec!["echo", "json_merge", "sleep", "sum"]
        );
    }
}
