//! Executor, agent and workflow registries
//!
//! Node kinds are dispatched through the [`ExecutorRegistry`]: kind →
//! executor behind the uniform [`NodeExecutor`] contract. Unknown kinds are
//! a configuration error (the persisted format already rejects unknown
//! tags at parse time, so this only triggers for custom registries).
//!
//! [`AgentRegistry`] resolves the `package` references of agent nodes and
//! [`WorkflowRegistry`] resolves `workflow_ref` names of nested-workflow
//! nodes.

use crate::cancel::CancelToken;
use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::node::{NodeConfig, NodeKind};
use crate::result::NodeExecutionResult;
use crate::spec::WorkflowSpec;
use crate::template::Scope;
use async_trait::async_trait;
use llm::LlmConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Everything an executor receives besides the node config
///
/// `inputs` is the context built from the node's input mappings (plus the
/// engine-injected identity fields exposed as struct members here).
/// `results` is an immutable snapshot of the accumulated results, used by
/// the `result.<node_id>.<path>` template namespace.
#[derive(Clone)]
pub struct NodeContext {
    /// Resolved input context (always a JSON object)
    pub inputs: Value,

    /// Id of the workflow (chain) being executed
    pub workflow_id: String,

    /// Id of this run
    pub execution_id: String,

    /// Id of the node being executed
    pub node_id: String,

    /// Zero-based attempt number (set by the retry wrapper)
    pub attempt: u32,

    /// Snapshot of the accumulated results at scheduling time
    pub results: Arc<HashMap<String, NodeExecutionResult>>,

    /// Cooperative cancellation token for this run
    pub cancel: CancelToken,
}

impl NodeContext {
    /// Template scope over the inputs and result snapshot
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(&self.inputs, &self.results)
    }
}

/// Uniform executor contract
///
/// Executors must honor cancellation at I/O boundaries, return failed
/// results (not errors) for expected failure modes, populate `usage` when
/// token-consuming services were called, and produce output compatible
/// with the node's declared output schema. Returning `Err` is reserved for
/// unexpected conditions; the wrapper converts it into a failed result.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute one node
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult>;
}

/// kind → executor lookup
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// Registry with all eight built-in executors registered
    pub fn with_builtins() -> Self {
        use crate::executors;

        let mut registry = Self {
            executors: HashMap::new(),
        };
        registry.register(NodeKind::Tool, Arc::new(executors::tool::ToolExecutor));
        registry.register(NodeKind::Llm, Arc::new(executors::llm::LlmExecutor));
        registry.register(NodeKind::Agent, Arc::new(executors::agent::AgentExecutor));
        registry.register(
            NodeKind::Condition,
            Arc::new(executors::condition::ConditionExecutor),
        );
        registry.register(NodeKind::Loop, Arc::new(executors::loop_node::LoopExecutor));
        registry.register(
            NodeKind::Parallel,
            Arc::new(executors::parallel::ParallelExecutor),
        );
        registry.register(
            NodeKind::Recursive,
            Arc::new(executors::recursive::RecursiveExecutor),
        );
        registry.register(
            NodeKind::NestedWorkflow,
            Arc::new(executors::nested::NestedWorkflowExecutor),
        );
        registry
    }

    /// Register (or replace) the executor for a kind
    pub fn register(&mut self, kind: NodeKind, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(kind, executor);
    }

    /// Look up the executor for a kind
    pub fn get(&self, kind: NodeKind) -> Result<Arc<dyn NodeExecutor>> {
        self.executors
            .get(&kind)
            .cloned()
            .ok_or_else(|| ChainError::config(format!("no executor registered for kind '{kind}'")))
    }
}

/// Registered agent definition resolved by `package` references
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// System instructions
    pub instructions: String,

    /// Provider/model configuration for the agent's reasoning calls
    pub llm_config: LlmConfig,

    /// Tools the agent may call; `None` = every registered tool
    pub allowed_tools: Option<Vec<String>>,

    /// Bound on reason–act rounds
    pub max_rounds: u32,
}

impl AgentDefinition {
    /// Create a definition with the default round bound
    pub fn new(instructions: impl Into<String>, llm_config: LlmConfig) -> Self {
        Self {
            instructions: instructions.into(),
            llm_config,
            allowed_tools: None,
            max_rounds: 2,
        }
    }

    /// Restrict the agent to the named tools
    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    /// Set the reason–act round bound
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }
}

/// name → agent definition
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, AgentDefinition>>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent definition
    pub fn register(&self, name: impl Into<String>, definition: AgentDefinition) {
        self.agents
            .write()
            .expect("agent registry lock poisoned")
            .insert(name.into(), definition);
    }

    /// Look up an agent definition
    pub fn get(&self, name: &str) -> Option<AgentDefinition> {
        self.agents
            .read()
            .expect("agent registry lock poisoned")
            .get(name)
            .cloned()
    }
}

/// name → workflow spec, for nested workflows by reference
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: Arc<RwLock<HashMap<String, WorkflowSpec>>>,
}

impl WorkflowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a workflow spec
    pub fn register(&self, name: impl Into<String>, spec: WorkflowSpec) {
        self.workflows
            .write()
            .expect("workflow registry lock poisoned")
            .insert(name.into(), spec);
    }

    /// Look up a workflow spec
    pub fn get(&self, name: &str) -> Option<WorkflowSpec> {
        self.workflows
            .read()
            .expect("workflow registry lock poisoned")
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::Provider;

    #[test]
    fn test_builtin_registry_covers_all_kinds() {
        let registry = ExecutorRegistry::with_builtins();
        for kind in [
            NodeKind::Tool,
            NodeKind::Llm,
            NodeKind::Agent,
            NodeKind::Condition,
            NodeKind::Loop,
            NodeKind::Parallel,
            NodeKind::Recursive,
            NodeKind::NestedWorkflow,
        ] {
            assert!(registry.get(kind).is_ok(), "missing executor for {kind}");
        }
    }

    #[test]
    fn test_agent_registry() {
        let registry = AgentRegistry::new();
        assert!(registry.get("researcher").is_none());

        registry.register(
            "researcher",
            AgentDefinition::new(
                "You research things",
                LlmConfig::new(Provider::OpenAi, "gpt-4o-mini"),
            )
            .with_allowed_tools(vec!["sum".into()])
            .with_max_rounds(3),
        );

        let definition = registry.get("researcher").unwrap();
        assert_eq!(definition.max_rounds, 3);
        assert_eq!(definition.allowed_tools, Some(vec!["sum".to_string()]));
    }

    #[test]
    fn test_max_rounds_floor() {
        let definition = AgentDefinition::new(
            "x",
            LlmConfig::new(Provider::OpenAi, "gpt-4o-mini"),
        )
        .with_max_rounds(0);
        assert_eq!(definition.max_rounds, 1);
    }
}
