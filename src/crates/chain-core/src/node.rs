//! Node configuration types
//!
//! A workflow is a list of [`NodeConfig`] values: a tagged union over the
//! eight node kinds the engine executes (tool, llm, agent, condition, loop,
//! parallel, recursive, nested_workflow). Every variant flattens the same
//! [`BaseNodeConfig`] common fields (identity, dependencies, retry and
//! timeout knobs, input/output mappings and schemas) and adds its
//! kind-specific payload.
//!
//! Configs are immutable during a run. Construction-time validation
//! (self-dependencies, mappings referencing undeclared dependencies, the
//! tool allow-list rule) lives in [`validate_nodes`]; graph-shape validation
//! (cycles, dangling ids) lives in [`crate::graph::DependencyGraph`].
//!
//! # Example
//!
//! ```rust
//! use chain_core::node::{NodeConfig, ToolNodeConfig, BaseNodeConfig};
//! use serde_json::json;
//!
//! let node: NodeConfig = serde_json::from_value(json!({
//!     "type": "tool",
//!     "id": "sum_inputs",
//!     "tool_name": "sum",
//!     "tool_args": {"numbers": [1, 2, 3]}
//! }))
//! .unwrap();
//!
//! assert_eq!(node.id(), "sum_inputs");
//! assert!(node.base().use_cache);
//! ```

use crate::error::{ChainError, Result};
use crate::spec::WorkflowSpec;
use llm::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Discriminator for the node kinds the engine knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Tool,
    Llm,
    Agent,
    Condition,
    Loop,
    Parallel,
    Recursive,
    NestedWorkflow,
}

impl NodeKind {
    /// Stable snake_case name, matching the `type` tag in the persisted format
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Tool => "tool",
            NodeKind::Llm => "llm",
            NodeKind::Agent => "agent",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Parallel => "parallel",
            NodeKind::Recursive => "recursive",
            NodeKind::NestedWorkflow => "nested_workflow",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from a placeholder in a node's input context to either a
/// dependency output or a literal value
///
/// The untagged representation means a JSON object carrying
/// `source_node_id`/`source_output_path` parses as a reference; any other
/// JSON value is bound to the placeholder verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputMapping {
    /// Pull a value out of a dependency's output
    Reference {
        /// Id of the dependency node the value comes from
        source_node_id: String,
        /// Dotted path inside the dependency's output ("" or "." = whole output)
        source_output_path: String,
        /// Optional transformation rules (reserved)
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        rules: Map<String, Value>,
    },
    /// Bind a literal value directly
    Literal(Value),
}

/// Common fields shared by all node configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseNodeConfig {
    /// Unique identifier within the workflow
    pub id: String,

    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Ids of prerequisite nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Hard timeout for node execution in seconds (None = no timeout, min 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Maximum number of retries if execution fails
    #[serde(default)]
    pub retries: u32,

    /// Base backoff seconds for exponential backoff between retries
    /// (0 disables the sleep)
    #[serde(default)]
    pub backoff_seconds: f64,

    /// Mapping of context placeholders to dependency outputs or literals
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input_mappings: HashMap<String, InputMapping>,

    /// Mapping of public alias → nested path inside this node's raw output
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output_mappings: HashMap<String, String>,

    /// Optional input schema: either `{field → type-name}` or a JSON Schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// Optional output schema: either `{field → type-name}` or a JSON Schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Whether cached results may be reused when context & config match
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Explicit allow-list of tool names (tool and agent nodes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
}

impl BaseNodeConfig {
    /// Create a base config with the given id and defaults everywhere else
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            dependencies: Vec::new(),
            timeout_seconds: None,
            retries: 0,
            backoff_seconds: 0.0,
            input_mappings: HashMap::new(),
            output_mappings: HashMap::new(),
            input_schema: None,
            output_schema: None,
            use_cache: true,
            allowed_tools: None,
        }
    }

    /// Add a dependency id
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Add an input mapping referencing a dependency output
    pub fn with_mapping(
        mut self,
        placeholder: impl Into<String>,
        source_node_id: impl Into<String>,
        source_output_path: impl Into<String>,
    ) -> Self {
        self.input_mappings.insert(
            placeholder.into(),
            InputMapping::Reference {
                source_node_id: source_node_id.into(),
                source_output_path: source_output_path.into(),
                rules: Map::new(),
            },
        );
        self
    }

    /// Bind a literal value to a placeholder
    pub fn with_literal(mut self, placeholder: impl Into<String>, value: Value) -> Self {
        self.input_mappings
            .insert(placeholder.into(), InputMapping::Literal(value));
        self
    }

    /// Set the retry count and base backoff
    pub fn with_retries(mut self, retries: u32, backoff_seconds: f64) -> Self {
        self.retries = retries;
        self.backoff_seconds = backoff_seconds;
        self
    }

    /// Set the per-node timeout in seconds
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Enable or disable result caching for this node
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the declared output schema
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

fn default_true() -> bool {
    true
}

/// Configuration for a deterministic tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Registered name of the tool to invoke
    pub tool_name: String,

    /// Arguments forwarded to the tool; strings may contain `{{ path }}`
    /// placeholders resolved against the node's input context
    #[serde(default = "default_tool_args")]
    pub tool_args: Value,
}

fn default_tool_args() -> Value {
    Value::Object(Map::new())
}

/// Configuration for an LLM completion node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Prompt template rendered against the input context
    pub prompt_template: String,

    /// Provider, model and sampling parameters
    pub llm_config: LlmConfig,

    /// Names of registered tools advertised to the model for function calling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

impl LlmNodeConfig {
    /// Model identifier this node targets
    pub fn model(&self) -> &str {
        &self.llm_config.model
    }
}

/// Per-node overrides applied on top of a registered agent definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOverrides {
    /// Replacement system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Replacement model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Replacement sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Replacement reason–act round limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

/// Configuration for a reasoning agent node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Name of the agent definition in the agent registry
    pub package: String,

    /// Optional overrides on top of the registered definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentOverrides>,

    /// Whether the agent gets a memory accessor
    #[serde(default)]
    pub enable_memory: bool,
}

/// Configuration for a branching condition node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Boolean expression evaluated against the node context;
    /// truthy → `true_branch` executes
    pub expression: String,

    /// Ids of nodes gated on the expression being truthy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub true_branch: Vec<String>,

    /// Ids of nodes gated on the expression being falsy (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_branch: Option<Vec<String>>,
}

/// Configuration for an iterating loop node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Path into accumulated results yielding the iterable
    /// (e.g. "fetch.items")
    pub items_source: String,

    /// Placeholder name bound to the current item inside the body
    pub item_var: String,

    /// Ids of the nodes forming the loop body
    pub body_node_ids: Vec<String>,

    /// Upper bound on iterations
    #[serde(default = "default_loop_iterations")]
    pub max_iterations: u32,
}

fn default_loop_iterations() -> u32 {
    100
}

/// One branch of a parallel fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelBranch {
    /// Branch identifier (key in the parallel node's output)
    pub id: String,

    /// Ids of the nodes forming the branch's inner mini-DAG
    pub node_ids: Vec<String>,
}

/// Configuration for a parallel fan-out node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Independent branches to run concurrently
    pub branches: Vec<ParallelBranch>,

    /// Maximum branches in flight at once (defaults to the engine's
    /// max_parallel)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

/// Configuration for a recursive refinement node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecursiveNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Ids of the nodes forming the recursion body
    pub body_node_ids: Vec<String>,

    /// Expression over the named state; truthy → converged
    pub convergence_expression: String,

    /// Named state variables with their initial values
    pub initial_state: Map<String, Value>,

    /// Upper bound on iterations
    #[serde(default = "default_recursive_iterations")]
    pub max_iterations: u32,

    /// Keep per-iteration outputs as a conversation log
    #[serde(default)]
    pub preserve_context: bool,
}

fn default_recursive_iterations() -> u32 {
    10
}

/// Configuration for a nested sub-workflow node
///
/// Exactly one of `workflow` (inline) or `workflow_ref` (registry name)
/// must be set; [`validate_nodes`] enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedWorkflowNodeConfig {
    #[serde(flatten)]
    pub base: BaseNodeConfig,

    /// Inline sub-workflow specification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowSpec>,

    /// Name of a sub-workflow in the workflow registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_ref: Option<String>,

    /// Mapping of public key → dotted path (`node_id.path`) inside the
    /// sub-workflow's outputs; empty → the whole output map is exposed
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub exposed_outputs: HashMap<String, String>,
}

/// Tagged union over all node kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Tool(ToolNodeConfig),
    Llm(LlmNodeConfig),
    Agent(AgentNodeConfig),
    Condition(ConditionNodeConfig),
    Loop(LoopNodeConfig),
    Parallel(ParallelNodeConfig),
    Recursive(RecursiveNodeConfig),
    NestedWorkflow(NestedWorkflowNodeConfig),
}

impl NodeConfig {
    /// The node's kind tag
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Tool(_) => NodeKind::Tool,
            NodeConfig::Llm(_) => NodeKind::Llm,
            NodeConfig::Agent(_) => NodeKind::Agent,
            NodeConfig::Condition(_) => NodeKind::Condition,
            NodeConfig::Loop(_) => NodeKind::Loop,
            NodeConfig::Parallel(_) => NodeKind::Parallel,
            NodeConfig::Recursive(_) => NodeKind::Recursive,
            NodeConfig::NestedWorkflow(_) => NodeKind::NestedWorkflow,
        }
    }

    /// The shared base fields
    pub fn base(&self) -> &BaseNodeConfig {
        match self {
            NodeConfig::Tool(n) => &n.base,
            NodeConfig::Llm(n) => &n.base,
            NodeConfig::Agent(n) => &n.base,
            NodeConfig::Condition(n) => &n.base,
            NodeConfig::Loop(n) => &n.base,
            NodeConfig::Parallel(n) => &n.base,
            NodeConfig::Recursive(n) => &n.base,
            NodeConfig::NestedWorkflow(n) => &n.base,
        }
    }

    /// The node's unique id
    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// Human-readable name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.base().name.as_deref().unwrap_or_else(|| self.id())
    }

    /// Declared dependency ids
    pub fn dependencies(&self) -> &[String] {
        &self.base().dependencies
    }

    /// Ids of nodes referenced by this node beyond plain dependencies
    /// (loop bodies, parallel branches, recursion bodies). Used by the
    /// graph validator to reject dangling references.
    pub fn referenced_node_ids(&self) -> Vec<&str> {
        match self {
            NodeConfig::Loop(n) => n.body_node_ids.iter().map(String::as_str).collect(),
            NodeConfig::Parallel(n) => n
                .branches
                .iter()
                .flat_map(|b| b.node_ids.iter().map(String::as_str))
                .collect(),
            NodeConfig::Recursive(n) => n.body_node_ids.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Construction-time validation of a node list
///
/// Checks, per node:
/// - the id is unique and non-empty
/// - no self-dependency
/// - every input mapping reference names a declared dependency
/// - `timeout_seconds`, when set, is at least 1
/// - `allowed_tools` appears only on tool and agent nodes
/// - nested nodes carry exactly one of `workflow` / `workflow_ref`
/// - loop/recursive bodies and parallel branches are non-empty
pub fn validate_nodes(nodes: &[NodeConfig]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();

    for node in nodes {
        let base = node.base();
        let id = &base.id;

        if id.is_empty() {
            return Err(ChainError::config("node id must not be empty"));
        }
        if !seen.insert(id.clone()) {
            return Err(ChainError::config(format!("duplicate node id '{id}'")));
        }
        if base.dependencies.iter().any(|d| d == id) {
            return Err(ChainError::config(format!(
                "node '{id}' cannot depend on itself"
            )));
        }
        if let Some(timeout) = base.timeout_seconds {
            if timeout < 1 {
                return Err(ChainError::config(format!(
                    "node '{id}' timeout_seconds must be at least 1"
                )));
            }
        }
        for (placeholder, mapping) in &base.input_mappings {
            if let InputMapping::Reference { source_node_id, .. } = mapping {
                if !base.dependencies.contains(source_node_id) {
                    return Err(ChainError::config(format!(
                        "input mapping '{placeholder}' on node '{id}' references \
                         '{source_node_id}' which is not a declared dependency"
                    )));
                }
            }
        }
        if base.allowed_tools.is_some()
            && !matches!(node.kind(), NodeKind::Tool | NodeKind::Agent)
        {
            return Err(ChainError::config(format!(
                "node '{id}' (type={}) is not allowed to declare allowed_tools",
                node.kind()
            )));
        }

        match node {
            NodeConfig::Loop(n) if n.body_node_ids.is_empty() => {
                return Err(ChainError::config(format!(
                    "loop node '{id}' has an empty body"
                )));
            }
            NodeConfig::Recursive(n) if n.body_node_ids.is_empty() => {
                return Err(ChainError::config(format!(
                    "recursive node '{id}' has an empty body"
                )));
            }
            NodeConfig::Parallel(n) => {
                if n.branches.is_empty() {
                    return Err(ChainError::config(format!(
                        "parallel node '{id}' has no branches"
                    )));
                }
                if n.branches.iter().any(|b| b.node_ids.is_empty()) {
                    return Err(ChainError::config(format!(
                        "parallel node '{id}' has an empty branch"
                    )));
                }
            }
            NodeConfig::NestedWorkflow(n) => {
                match (&n.workflow, &n.workflow_ref) {
                    (Some(_), Some(_)) => {
                        return Err(ChainError::config(format!(
                            "nested workflow node '{id}' declares both an inline \
                             workflow and a workflow_ref"
                        )));
                    }
                    (None, None) => {
                        return Err(ChainError::config(format!(
                            "nested workflow node '{id}' declares neither an inline \
                             workflow nor a workflow_ref"
                        )));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_node(id: &str) -> NodeConfig {
        NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new(id),
            tool_name: "echo".into(),
            tool_args: json!({}),
        })
    }

    #[test]
    fn test_tagged_parse_and_roundtrip() {
        let raw = json!({
            "type": "condition",
            "id": "check",
            "dependencies": ["a"],
            "expression": "value > 5",
            "true_branch": ["t"],
            "false_branch": ["f"]
        });
        let node: NodeConfig = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.kind(), NodeKind::Condition);
        assert_eq!(node.id(), "check");

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["type"], "condition");
        assert_eq!(back["expression"], "value > 5");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let raw = json!({"type": "teleport", "id": "x"});
        assert!(serde_json::from_value::<NodeConfig>(raw).is_err());
    }

    #[test]
    fn test_input_mapping_untagged() {
        let reference: InputMapping = serde_json::from_value(json!({
            "source_node_id": "a",
            "source_output_path": "data.items.0"
        }))
        .unwrap();
        assert!(matches!(reference, InputMapping::Reference { .. }));

        let literal: InputMapping = serde_json::from_value(json!(42)).unwrap();
        assert!(matches!(literal, InputMapping::Literal(v) if v == json!(42)));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut node = tool_node("a");
        if let NodeConfig::Tool(ref mut t) = node {
            t.base.dependencies.push("a".into());
        }
        let err = validate_nodes(&[node]).unwrap_err();
        assert!(err.to_string().contains("cannot depend on itself"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = validate_nodes(&[tool_node("a"), tool_node("a")]).unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }

    #[test]
    fn test_mapping_must_reference_dependency() {
        let mut node = tool_node("b");
        if let NodeConfig::Tool(ref mut t) = node {
            t.base = BaseNodeConfig::new("b").with_mapping("x", "not_a_dep", "value");
        }
        let err = validate_nodes(&[node]).unwrap_err();
        assert!(err.to_string().contains("not a declared dependency"));
    }

    #[test]
    fn test_allowed_tools_only_on_tool_and_agent() {
        let node = NodeConfig::Condition(ConditionNodeConfig {
            base: BaseNodeConfig {
                allowed_tools: Some(vec!["sum".into()]),
                ..BaseNodeConfig::new("c")
            },
            expression: "true".into(),
            true_branch: vec![],
            false_branch: None,
        });
        let err = validate_nodes(&[node]).unwrap_err();
        assert!(err.to_string().contains("allowed_tools"));

        let ok = NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig {
                allowed_tools: Some(vec!["sum".into()]),
                ..BaseNodeConfig::new("t")
            },
            tool_name: "sum".into(),
            tool_args: json!({}),
        });
        assert!(validate_nodes(&[ok]).is_ok());
    }

    #[test]
    fn test_nested_workflow_exclusivity() {
        let neither = NodeConfig::NestedWorkflow(NestedWorkflowNodeConfig {
            base: BaseNodeConfig::new("n"),
            workflow: None,
            workflow_ref: None,
            exposed_outputs: HashMap::new(),
        });
        assert!(validate_nodes(&[neither]).is_err());

        let by_ref = NodeConfig::NestedWorkflow(NestedWorkflowNodeConfig {
            base: BaseNodeConfig::new("n"),
            workflow: None,
            workflow_ref: Some("sub".into()),
            exposed_outputs: HashMap::new(),
        });
        assert!(validate_nodes(&[by_ref]).is_ok());
    }

    #[test]
    fn test_timeout_minimum() {
        let node = NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig {
                timeout_seconds: Some(0),
                ..BaseNodeConfig::new("t")
            },
            tool_name: "echo".into(),
            tool_args: json!({}),
        });
        assert!(validate_nodes(&[node]).is_err());
    }
}
