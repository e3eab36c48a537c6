//! Persisted workflow format
//!
//! Workflows are stored as JSON documents:
//!
//! ```json
//! {
//!   "blueprint_id": "demo-001",
//!   "version": "1.0.0",
//!   "name": "sum-then-summarize",
//!   "nodes": [
//!     {"type": "tool", "id": "a", "tool_name": "sum",
//!      "tool_args": {"numbers": [1, 2, 3]}},
//!     {"type": "llm", "id": "b", "dependencies": ["a"],
//!      "input_mappings": {"total": {"source_node_id": "a",
//!                                   "source_output_path": "sum"}},
//!      "prompt_template": "Total is {{ total }}",
//!      "llm_config": {"model": "gpt-4o-mini"}}
//!   ]
//! }
//! ```
//!
//! Unknown fields at the *top level* are preserved across a
//! load/store round trip. Unknown fields *inside a node* are a validation
//! error (none of the built-in kinds opts into extras), as is an unknown
//! `type` tag; both are rejected before deserialization so the error
//! names the offending node and field.

use crate::error::{ChainError, Result};
use crate::node::NodeConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// A persisted workflow document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Stable identifier of the blueprint this spec came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_id: Option<String>,

    /// Semantic version of the document
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable workflow name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The node list
    pub nodes: Vec<NodeConfig>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// Unknown top-level fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl WorkflowSpec {
    /// Create a spec from a node list with defaults elsewhere
    pub fn new(nodes: Vec<NodeConfig>) -> Self {
        Self {
            blueprint_id: None,
            version: default_version(),
            name: None,
            nodes,
            metadata: None,
            extra: Map::new(),
        }
    }

    /// Set the workflow name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse and validate a spec from a JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        validate_document(&value)?;
        let spec: WorkflowSpec = serde_json::from_value(value)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse and validate a spec from a JSON string
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Post-parse validation: version shape and node-level rules
    pub fn validate(&self) -> Result<()> {
        if !version_regex().is_match(&self.version) {
            return Err(ChainError::config(format!(
                "version '{}' is not a semantic version",
                self.version
            )));
        }
        if self.nodes.is_empty() {
            return Err(ChainError::config("workflow must contain at least one node"));
        }
        crate::node::validate_nodes(&self.nodes)?;
        for node in &self.nodes {
            if let NodeConfig::NestedWorkflow(nested) = node {
                if let Some(sub) = &nested.workflow {
                    sub.validate()?;
                }
            }
        }
        Ok(())
    }
}

fn version_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\d+\.\d+\.\d+$").expect("valid regex"))
}

/// Fields every node kind accepts
const BASE_FIELDS: &[&str] = &[
    "type",
    "id",
    "name",
    "dependencies",
    "timeout_seconds",
    "retries",
    "backoff_seconds",
    "input_mappings",
    "output_mappings",
    "input_schema",
    "output_schema",
    "use_cache",
    "allowed_tools",
];

/// Kind-specific fields, keyed by the `type` tag
fn kind_fields(kind: &str) -> Option<&'static [&'static str]> {
    Some(match kind {
        "tool" => &["tool_name", "tool_args"],
        "llm" => &["prompt_template", "llm_config", "tools"],
        "agent" => &["package", "agent_config", "enable_memory"],
        "condition" => &["expression", "true_branch", "false_branch"],
        "loop" => &["items_source", "item_var", "body_node_ids", "max_iterations"],
        "parallel" => &["branches", "max_concurrency"],
        "recursive" => &[
            "body_node_ids",
            "convergence_expression",
            "initial_state",
            "max_iterations",
            "preserve_context",
        ],
        "nested_workflow" => &["workflow", "workflow_ref", "exposed_outputs"],
        _ => return None,
    })
}

/// Structural checks serde cannot express: unknown node types and unknown
/// per-node fields (deny-unknown-fields does not compose with the
/// flattened base config, so the check runs on the raw document)
fn validate_document(value: &Value) -> Result<()> {
    let Some(document) = value.as_object() else {
        return Err(ChainError::config("workflow document must be a JSON object"));
    };
    let Some(nodes) = document.get("nodes").and_then(Value::as_array) else {
        return Err(ChainError::config(
            "workflow document must contain a 'nodes' array",
        ));
    };

    for (index, node) in nodes.iter().enumerate() {
        let Some(node) = node.as_object() else {
            return Err(ChainError::config(format!(
                "node at index {index} is not an object"
            )));
        };
        let id = node
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<missing id>");
        let Some(kind) = node.get("type").and_then(Value::as_str) else {
            return Err(ChainError::config(format!(
                "node '{id}' is missing the 'type' tag"
            )));
        };
        let Some(specific) = kind_fields(kind) else {
            return Err(ChainError::config(format!(
                "node '{id}' has unknown type '{kind}'"
            )));
        };
        for field in node.keys() {
            if !BASE_FIELDS.contains(&field.as_str()) && !specific.contains(&field.as_str()) {
                return Err(ChainError::config(format!(
                    "node '{id}' (type={kind}) has unknown field '{field}'"
                )));
            }
        }
        // Inline sub-workflows get the same structural checks
        if kind == "nested_workflow" {
            if let Some(sub) = node.get("workflow") {
                validate_document(sub)?;
            }
        }
    }
    Ok(())
}
