//! Tool contract and registry
//!
//! Tools are the deterministic compute units a workflow can invoke: pure-ish
//! async functions with a declared JSON parameter schema and an optional
//! output schema. Both top-level tool nodes and agents resolve tools through
//! the [`ToolRegistry`].
//!
//! # Contract
//!
//! - `run` receives the already-resolved argument object and returns a JSON
//!   value or a [`ToolError`]. Expected failures (bad arguments, missing
//!   resources) must come back as `Err`, not panics.
//! - The engine does not guarantee once-only execution under retries; tools
//!   must be safe to re-run or deduplicate on their own.
//!
//! # Quick Start
//!
//! ```rust
//! use tooling::tool::{Tool, ToolRegistry, ToolResult, ToolError};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct Doubler;
//!
//! #[async_trait]
//! impl Tool for Doubler {
//!     fn name(&self) -> &str {
//!         "doubler"
//!     }
//!
//!     fn parameters_schema(&self) -> Value {
//!         json!({
//!             "type": "object",
//!             "properties": {"value": {"type": "number"}},
//!             "required": ["value"]
//!         })
//!     }
//!
//!     async fn run(&self, args: Value) -> ToolResult {
//!         let value = args["value"]
//!             .as_f64()
//!             .ok_or_else(|| ToolError::InvalidArguments {
//!                 tool: "doubler".to_string(),
//!                 reason: "'value' must be a number".to_string(),
//!             })?;
//!         Ok(json!({"value": value * 2.0}))
//!     }
//! }
//!
//! let registry = ToolRegistry::new();
//! registry.register(std::sync::Arc::new(Doubler)).unwrap();
//! assert!(registry.get("doubler").is_some());
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors produced by tool resolution and execution
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool name is not registered
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// A tool with the same name is already registered
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    /// The argument object did not match the tool's expectations
    #[error("Tool '{tool}' received invalid arguments: {reason}")]
    InvalidArguments {
        /// Name of the tool
        tool: String,
        /// Why the arguments were rejected
        reason: String,
    },

    /// The tool ran but failed
    #[error("Tool '{tool}' execution failed: {error}")]
    ExecutionFailed {
        /// Name of the tool
        tool: String,
        /// Error message from the tool
        error: String,
    },
}

impl ToolError {
    /// Create an execution failure with context
    pub fn execution(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool: tool.into(),
            error: error.into(),
        }
    }

    /// Create an invalid-arguments error with context
    pub fn invalid_args(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for tool execution
pub type ToolResult = std::result::Result<Value, ToolError>;

/// A callable tool exposed to workflows and agents
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry name of the tool
    fn name(&self) -> &str;

    /// Human-readable description surfaced to agents
    fn description(&self) -> &str {
        ""
    }

    /// JSON schema describing the expected argument object
    fn parameters_schema(&self) -> Value;

    /// Optional JSON schema describing the tool's output
    fn output_schema(&self) -> Option<Value> {
        None
    }

    /// Execute the tool with the given argument object
    async fn run(&self, args: Value) -> ToolResult;
}

/// Serializable description of a tool, in the shape LLM providers expect
/// for function calling
pub fn tool_descriptor(tool: &dyn Tool) -> Value {
    serde_json::json!({
        "name": tool.name(),
        "description": tool.description(),
        "parameters": tool.parameters_schema(),
    })
}

/// Thread-safe collection of registered tools
///
/// Lookups clone the `Arc`, so registry reads never block tool execution.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; fails if the name is already taken
    pub fn register(&self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        if tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        tracing::debug!(tool = %name, "registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Register a tool, replacing any existing tool of the same name
    pub fn register_replace(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        tools.insert(name, tool);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Whether a tool with the given name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .contains_key(name)
    }

    /// Names of all registered tools, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// All registered tools
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry lock poisoned").len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase a string"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn run(&self, args: Value) -> ToolResult {
            let text = args["text"]
                .as_str()
                .ok_or_else(|| ToolError::invalid_args("upper", "'text' must be a string"))?;
            Ok(json!({"text": text.to_uppercase()}))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Upper)).unwrap();

        assert!(registry.contains("upper"));
        assert!(registry.get("upper").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["upper".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Upper)).unwrap();

        let err = registry.register(Arc::new(Upper)).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "upper"));
    }

    #[test]
    fn test_register_replace() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Upper)).unwrap();
        registry.register_replace(Arc::new(Upper));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_run() {
        let tool = Upper;
        let out = tool.run(json!({"text": "abc"})).await.unwrap();
        assert_eq!(out, json!({"text": "ABC"}));

        let err = tool.run(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_tool_descriptor() {
        let descriptor = tool_descriptor(&Upper);
        assert_eq!(descriptor["name"], "upper");
        assert_eq!(descriptor["description"], "Uppercase a string");
        assert!(descriptor["parameters"].is_object());
    }
}
