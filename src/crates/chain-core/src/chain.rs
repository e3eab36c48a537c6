//! Chain construction and level-based execution
//!
//! [`Chain`] is the engine entry point: it owns the validated node set, the
//! dependency graph, the injected collaborators (tool/agent/workflow
//! registries, LLM service, context store, cache, memory, guards) and the
//! per-run state (metrics, branch decisions).
//!
//! # Execution model
//!
//! ```text
//! for each topological level (ascending):
//!     1. depth guard / depth ceiling
//!     2. filter to branch-gating-active nodes
//!     3. build inputs, admit through a weighted limiter, run concurrently
//!        (each node inside the retry/cache/validation wrapper)
//!     4. merge results; update metrics; token guard / token ceiling
//!     5. record condition decisions
//!     6. failure policy: halt / continue-possible / always
//! ```
//!
//! A fresh weighted limiter is created per level (and per sub-DAG run
//! inside loop/parallel/nested executors): container nodes hold their own
//! admission weight while their bodies run, so sharing one limiter would
//! deadlock once capacity filled up with containers.
//!
//! The engine is constructed per run; a second `execute` call on the same
//! chain reuses accumulated metrics and branch decisions and is not
//! supported.
//!
//! # Example
//!
//! ```rust,ignore
//! use chain_core::chain::Chain;
//! use chain_core::spec::WorkflowSpec;
//!
//! let spec = WorkflowSpec::from_json(raw_json)?;
//! let chain = Chain::from_spec(spec)
//!     .tools(tool_registry)
//!     .llm_service(llm)
//!     .build()?;
//! let result = chain.execute(None).await?;
//! println!("success={} tokens={}", result.success, result.token_stats.total_tokens);
//! ```

use crate::cache::{InMemoryResultCache, KeyedMutex, ResultCache};
use crate::cancel::{CancelHandle, CancelToken};
use crate::context::{ContextStore, InMemoryContextStore};
use crate::error::{ChainError, Result};
use crate::gating::BranchGating;
use crate::graph::DependencyGraph;
use crate::guard::{ChainOptions, DepthGuard, FailurePolicy, TokenGuard};
use crate::memory::MemoryStore;
use crate::metrics::ChainMetrics;
use crate::node::{validate_nodes, NodeConfig, NodeKind};
use crate::registry::{AgentRegistry, ExecutorRegistry, WorkflowRegistry};
use crate::result::{NodeExecutionResult, NodeMetadata, TokenStats, WorkflowResult};
use crate::runner;
use crate::sem::WeightedSemaphore;
use crate::spec::WorkflowSpec;
use chrono::Utc;
use llm::LlmService;
use serde_json::Value;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tooling::ToolRegistry;
use uuid::Uuid;

/// How sub-DAG nodes are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchMode {
    /// Through the full per-node wrapper (retry, cache, validation)
    Wrapped,
    /// Straight to the executor (used by recursive iteration bodies, which
    /// are covered by the outer recursive node's wrapper)
    Direct,
}

/// A validated, executable workflow
pub struct Chain {
    workflow_id: String,
    name: String,
    version: String,
    pub(crate) nodes: HashMap<String, NodeConfig>,
    pub(crate) graph: DependencyGraph,
    pub(crate) options: ChainOptions,
    pub(crate) executors: ExecutorRegistry,
    tools: ToolRegistry,
    agents: AgentRegistry,
    workflows: WorkflowRegistry,
    llm_service: Option<Arc<dyn LlmService>>,
    memory: Option<Arc<dyn MemoryStore>>,
    pub(crate) context_store: Arc<dyn ContextStore>,
    pub(crate) cache: Arc<dyn ResultCache>,
    pub(crate) flights: KeyedMutex,
    pub(crate) token_guard: Option<TokenGuard>,
    pub(crate) depth_guard: Option<DepthGuard>,
    initial_context: Option<Value>,
    /// Nodes owned by a container (loop/parallel/recursive body members);
    /// they run only through their container, never as top-level nodes
    container_members: HashSet<String>,
    metrics: Mutex<ChainMetrics>,
    gating: Mutex<BranchGating>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("workflow_id", &self.workflow_id)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Chain {
    /// Start building a chain from a node list
    pub fn builder(nodes: Vec<NodeConfig>) -> ChainBuilder {
        ChainBuilder::new(nodes)
    }

    /// Start building a chain from a persisted spec
    pub fn from_spec(spec: WorkflowSpec) -> ChainBuilder {
        let mut builder = ChainBuilder::new(spec.nodes);
        if let Some(name) = spec.name {
            builder = builder.name(name);
        }
        builder.version(spec.version)
    }

    /// Unique id of this chain instance
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Chain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chain version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Engine configuration
    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// Tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Agent registry
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Workflow registry (nested workflows by name)
    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    /// LLM service, when configured
    pub fn llm_service(&self) -> Option<&Arc<dyn LlmService>> {
        self.llm_service.as_ref()
    }

    /// Memory store, when configured
    pub fn memory(&self) -> Option<&Arc<dyn MemoryStore>> {
        self.memory.as_ref()
    }

    /// Node config by id
    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.get(id)
    }

    /// The validated dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Snapshot of accumulated token statistics
    pub fn token_stats(&self) -> TokenStats {
        self.metrics.lock().expect("metrics lock poisoned").as_stats()
    }

    /// Advisory static validation; returns problems without failing
    ///
    /// Construction already rejects fatal problems; these are the softer
    /// checks an operator may want surfaced before running.
    pub fn validate_chain(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for node in self.nodes.values() {
            if let NodeConfig::Agent(agent) = node {
                if self.agents.get(&agent.package).is_none() {
                    problems.push(format!(
                        "agent node '{}' references unregistered package '{}'",
                        node.id(),
                        agent.package
                    ));
                }
            }
            if let NodeConfig::NestedWorkflow(nested) = node {
                if let Some(name) = &nested.workflow_ref {
                    if self.workflows.get(name).is_none() {
                        problems.push(format!(
                            "nested workflow node '{}' references unregistered workflow '{name}'",
                            node.id()
                        ));
                    }
                }
            }
            if matches!(node.kind(), NodeKind::Llm | NodeKind::Agent)
                && self.llm_service.is_none()
            {
                problems.push(format!(
                    "node '{}' needs an LLM service but none is configured",
                    node.id()
                ));
            }
        }
        problems
    }

    /// Execute the workflow
    ///
    /// `execution_id` scopes context-store writes; one is generated when
    /// absent. Returns `Err` only for HALT-policy re-raises; every other
    /// failure mode is reported inside the returned [`WorkflowResult`].
    pub async fn execute(&self, execution_id: Option<String>) -> Result<WorkflowResult> {
        let execution_id = execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let start_time = Utc::now();
        let started = std::time::Instant::now();

        tracing::info!(
            chain_id = %self.workflow_id,
            chain_name = %self.name,
            node_count = self.nodes.len(),
            levels = self.graph.levels().len(),
            execution_id = %execution_id,
            "starting chain execution"
        );

        let (cancel_handle, cancel) = CancelToken::pair();
        let mut results: HashMap<String, NodeExecutionResult> = HashMap::new();
        let mut errors: Vec<String> = Vec::new();
        let mut failed_nodes: HashSet<String> = HashSet::new();
        let mut last_failure: Option<(String, String)> = None;

        let level_keys: Vec<usize> = self.graph.levels().keys().copied().collect();
        'levels: for (level_idx, level_key) in level_keys.iter().enumerate() {
            let level_idx = level_idx + 1; // 1-based depth

            if let Some(guard) = &self.depth_guard {
                if !guard(level_idx, self.options.depth_ceiling) {
                    errors.push("Depth guard aborted execution".to_string());
                    break;
                }
            }
            if let Some(ceiling) = self.options.depth_ceiling {
                if level_idx > ceiling {
                    tracing::warn!(ceiling, "depth ceiling reached; aborting further levels");
                    errors.push("Depth ceiling reached".to_string());
                    break;
                }
            }

            let level_node_ids = &self.graph.levels()[level_key];
            let active_ids: Vec<String> = {
                let mut gating = self.gating.lock().expect("gating lock poisoned");
                level_node_ids
                    .iter()
                    .filter(|id| !self.container_members.contains(id.as_str()))
                    .filter(|id| gating.is_active(id, &self.nodes, &self.graph))
                    .cloned()
                    .collect()
            };
            if active_ids.is_empty() {
                continue;
            }

            let limiter = WeightedSemaphore::new(self.options.max_parallel);
            let snapshot = Arc::new(results.clone());
            let level_results = self
                .run_nodes(
                    &active_ids,
                    snapshot,
                    &limiter,
                    &execution_id,
                    &cancel,
                    None,
                    Some(&cancel_handle),
                    DispatchMode::Wrapped,
                )
                .await;

            // Merge in declaration order for deterministic bookkeeping
            for node_id in &active_ids {
                let Some(result) = level_results.get(node_id) else {
                    continue;
                };
                results.insert(node_id.clone(), result.clone());

                if result.success && result.usage.is_some() {
                    let total_tokens = {
                        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
                        metrics.update(node_id, result);
                        metrics.total_tokens
                    };

                    if let Some(guard) = &self.token_guard {
                        if !guard(total_tokens, self.options.token_ceiling) {
                            errors.push("Token guard aborted execution".to_string());
                            cancel_handle.cancel();
                            break 'levels;
                        }
                    }
                    if let Some(ceiling) = self.options.token_ceiling {
                        if total_tokens > ceiling {
                            tracing::warn!(ceiling, total_tokens, "token ceiling exceeded");
                            errors.push("Token ceiling exceeded".to_string());
                            cancel_handle.cancel();
                            break 'levels;
                        }
                    }
                }

                // Condition decisions are recorded from any result carrying
                // a boolean-convertible `result` field, success or not
                if matches!(self.nodes.get(node_id), Some(NodeConfig::Condition(_))) {
                    if let Some(decision) = result
                        .output
                        .as_ref()
                        .and_then(|o| o.get("result"))
                        .map(crate::expr::is_truthy)
                    {
                        self.gating
                            .lock()
                            .expect("gating lock poisoned")
                            .record(node_id, decision);
                    }
                }

                if !result.success {
                    let message = result.error.clone().unwrap_or_else(|| "unknown".into());
                    errors.push(format!("Node {node_id} failed: {message}"));
                    failed_nodes.insert(node_id.clone());
                    last_failure = Some((node_id.clone(), message));
                }
            }

            if !errors.is_empty() && !self.should_continue(&failed_nodes, &results) {
                tracing::warn!(
                    policy = ?self.options.failure_policy,
                    "failure policy stopped execution"
                );
                cancel_handle.cancel();
                break;
            }
        }

        let execution_time = started.elapsed().as_secs_f64();
        tracing::info!(
            chain = %self.name,
            duration = execution_time,
            errors = errors.len(),
            "completed chain execution"
        );

        if self.options.failure_policy == FailurePolicy::Halt {
            if let Some((node_id, message)) = last_failure {
                return Err(ChainError::executor(node_id, message));
            }
        }

        let final_node_id = self
            .graph
            .leaves()
            .into_iter()
            .find(|id| !self.container_members.contains(id))
            .unwrap_or_else(|| self.workflow_id.clone());
        let final_kind = self
            .nodes
            .get(&final_node_id)
            .map(|n| n.kind())
            .unwrap_or(NodeKind::Tool);

        Ok(WorkflowResult {
            success: errors.is_empty(),
            output: results,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("\n"))
            },
            metadata: NodeMetadata {
                node_id: final_node_id,
                node_kind: final_kind,
                name: Some(self.name.clone()),
                start_time,
                end_time: Some(Utc::now()),
                duration: Some(execution_time),
                error_type: None,
                retry_count: 0,
            },
            execution_time,
            token_stats: self.token_stats(),
        })
    }

    /// Run a set of independent nodes concurrently under a limiter
    ///
    /// Executor errors become failed results inside the wrapper, so
    /// siblings finish undisturbed. Under HALT (signalled via
    /// `halt_handle`), the first failure cancels the run token;
    /// still-running executors observe it at their next await point.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn run_nodes(
        &self,
        node_ids: &[String],
        snapshot: Arc<HashMap<String, NodeExecutionResult>>,
        limiter: &WeightedSemaphore,
        execution_id: &str,
        cancel: &CancelToken,
        extra_context: Option<&Value>,
        halt_handle: Option<&CancelHandle>,
        mode: DispatchMode,
    ) -> HashMap<String, NodeExecutionResult> {
        let initial = self.merged_initial_context(extra_context);

        // Cooperative fan-out: the node futures are multiplexed on the
        // current task, completing in whatever order the limiter and their
        // I/O allow
        let mut in_flight = FuturesUnordered::new();
        for node_id in node_ids {
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            let snapshot = Arc::clone(&snapshot);
            let cancel = cancel.clone();
            let initial = initial.clone();
            in_flight.push(async move {
                let _permit = limiter.admit(node).await;
                let result = match mode {
                    DispatchMode::Wrapped => {
                        runner::execute_node(self, node, snapshot, execution_id, cancel, initial)
                            .await
                    }
                    DispatchMode::Direct => {
                        runner::dispatch_node(self, node, snapshot, execution_id, cancel, initial)
                            .await
                    }
                };
                (node_id.clone(), result)
            });
        }

        let mut level_results = HashMap::new();
        while let Some((node_id, result)) = in_flight.next().await {
            if !result.success {
                if let Some(handle) = halt_handle {
                    if self.options.failure_policy == FailurePolicy::Halt {
                        handle.cancel();
                    }
                }
            }
            level_results.insert(node_id, result);
        }
        level_results
    }

    /// Execute a subset of nodes as its own mini-DAG
    ///
    /// Used by loop bodies, parallel branches and recursive iterations.
    /// Levels come from the subset-restricted graph; external dependencies
    /// are satisfied by `base_results`. Returns results for subset nodes
    /// only.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn execute_subgraph(
        &self,
        node_ids: &[String],
        base_results: &HashMap<String, NodeExecutionResult>,
        extra_context: Option<&Value>,
        execution_id: &str,
        cancel: &CancelToken,
        capacity: usize,
        mode: DispatchMode,
    ) -> HashMap<String, NodeExecutionResult> {
        let levels = self.graph.subgraph_levels(node_ids);
        let limiter = WeightedSemaphore::new(capacity);
        let mut accumulated = base_results.clone();
        let mut subgraph_results = HashMap::new();

        for ids in levels.values() {
            let snapshot = Arc::new(accumulated.clone());
            let level_results = self
                .run_nodes(
                    ids,
                    snapshot,
                    &limiter,
                    execution_id,
                    cancel,
                    extra_context,
                    None,
                    mode,
                )
                .await;
            for (id, result) in level_results {
                accumulated.insert(id.clone(), result.clone());
                subgraph_results.insert(id, result);
            }
        }
        subgraph_results
    }

    /// Merge the chain's initial context with per-call extras
    fn merged_initial_context(&self, extra: Option<&Value>) -> Option<Value> {
        match (&self.initial_context, extra) {
            (None, None) => None,
            (Some(initial), None) => Some(initial.clone()),
            (None, Some(extra)) => Some(extra.clone()),
            (Some(initial), Some(extra)) => {
                let mut merged = initial.as_object().cloned().unwrap_or_default();
                if let Some(extra) = extra.as_object() {
                    for (k, v) in extra {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                Some(Value::Object(merged))
            }
        }
    }

    /// Failure-policy decision after a level committed
    fn should_continue(
        &self,
        failed_nodes: &HashSet<String>,
        results: &HashMap<String, NodeExecutionResult>,
    ) -> bool {
        match self.options.failure_policy {
            FailurePolicy::Halt => false,
            FailurePolicy::Always => true,
            FailurePolicy::ContinuePossible => {
                // Some remaining node must be runnable: not yet executed and
                // not downstream of any failed node
                let blocked = self.graph.transitive_dependents(failed_nodes);
                let runnable = self.graph.node_ids().iter().any(|id| {
                    !self.container_members.contains(id)
                        && !results.contains_key(id)
                        && !failed_nodes.contains(id)
                        && !blocked.contains(id)
                });
                if runnable {
                    tracing::info!("continuing: independent nodes remain runnable");
                } else {
                    tracing::warn!(
                        ?failed_nodes,
                        "stopping: all remaining nodes depend on failed nodes"
                    );
                }
                runnable
            }
        }
    }
}

/// Builder for [`Chain`]
pub struct ChainBuilder {
    nodes: Vec<NodeConfig>,
    name: Option<String>,
    version: String,
    chain_id: Option<String>,
    options: ChainOptions,
    executors: Option<ExecutorRegistry>,
    tools: ToolRegistry,
    agents: AgentRegistry,
    workflows: WorkflowRegistry,
    llm_service: Option<Arc<dyn LlmService>>,
    memory: Option<Arc<dyn MemoryStore>>,
    context_store: Option<Arc<dyn ContextStore>>,
    cache: Option<Arc<dyn ResultCache>>,
    token_guard: Option<TokenGuard>,
    depth_guard: Option<DepthGuard>,
    initial_context: Option<Value>,
}

impl ChainBuilder {
    fn new(nodes: Vec<NodeConfig>) -> Self {
        Self {
            nodes,
            name: None,
            version: "1.0.0".to_string(),
            chain_id: None,
            options: ChainOptions::default(),
            executors: None,
            tools: ToolRegistry::new(),
            agents: AgentRegistry::new(),
            workflows: WorkflowRegistry::new(),
            llm_service: None,
            memory: None,
            context_store: None,
            cache: None,
            token_guard: None,
            depth_guard: None,
            initial_context: None,
        }
    }

    /// Set the chain name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the chain version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set an explicit chain id (defaults to a fresh UUID)
    pub fn chain_id(mut self, id: impl Into<String>) -> Self {
        self.chain_id = Some(id.into());
        self
    }

    /// Set engine options
    pub fn options(mut self, options: ChainOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the executor registry (defaults to the built-ins)
    pub fn executors(mut self, registry: ExecutorRegistry) -> Self {
        self.executors = Some(registry);
        self
    }

    /// Set the tool registry
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the agent registry
    pub fn agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = agents;
        self
    }

    /// Set the workflow registry
    pub fn workflows(mut self, workflows: WorkflowRegistry) -> Self {
        self.workflows = workflows;
        self
    }

    /// Set the LLM service
    pub fn llm_service(mut self, service: Arc<dyn LlmService>) -> Self {
        self.llm_service = Some(service);
        self
    }

    /// Set the memory store
    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Set the context store (defaults to in-memory)
    pub fn context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }

    /// Set the result cache (defaults to in-memory)
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Install a token guard callback
    pub fn token_guard(mut self, guard: TokenGuard) -> Self {
        self.token_guard = Some(guard);
        self
    }

    /// Install a depth guard callback
    pub fn depth_guard(mut self, guard: DepthGuard) -> Self {
        self.depth_guard = Some(guard);
        self
    }

    /// Workflow-level initial context bound into every node's inputs
    /// (explicit mappings override on collision)
    pub fn initial_context(mut self, context: Value) -> Self {
        self.initial_context = Some(context);
        self
    }

    /// Validate everything and assemble the chain
    pub fn build(self) -> Result<Chain> {
        validate_nodes(&self.nodes)?;
        let graph = DependencyGraph::new(&self.nodes)?;

        for warning in graph.validate_schema_alignment(&self.nodes) {
            tracing::warn!(%warning, "schema alignment");
        }

        // Tool names are checked only when a registry was injected
        if !self.tools.is_empty() {
            for node in &self.nodes {
                if let NodeConfig::Tool(tool_node) = node {
                    if !self.tools.contains(&tool_node.tool_name) {
                        return Err(ChainError::config(format!(
                            "tool node '{}' references unknown tool '{}'",
                            node.id(),
                            tool_node.tool_name
                        )));
                    }
                }
            }
        }

        let container_members: HashSet<String> = self
            .nodes
            .iter()
            .flat_map(|n| n.referenced_node_ids())
            .map(String::from)
            .collect();

        let workflow_id = self
            .chain_id
            .unwrap_or_else(|| format!("chain_{}", Uuid::new_v4()));
        let name = self.name.unwrap_or_else(|| workflow_id.clone());
        let nodes: HashMap<String, NodeConfig> = self
            .nodes
            .into_iter()
            .map(|n| (n.id().to_string(), n))
            .collect();

        tracing::info!(
            chain = %name,
            nodes = nodes.len(),
            levels = graph.levels().len(),
            "initialized chain"
        );

        Ok(Chain {
            workflow_id,
            name,
            version: self.version,
            nodes,
            graph,
            options: self.options,
            executors: self.executors.unwrap_or_else(ExecutorRegistry::with_builtins),
            tools: self.tools,
            agents: self.agents,
            workflows: self.workflows,
            llm_service: self.llm_service,
            memory: self.memory,
            context_store: self
                .context_store
                .unwrap_or_else(|| Arc::new(InMemoryContextStore::new())),
            cache: self.cache.unwrap_or_else(|| Arc::new(InMemoryResultCache::new())),
            flights: KeyedMutex::new(),
            token_guard: self.token_guard,
            depth_guard: self.depth_guard,
            initial_context: self.initial_context,
            container_members,
            metrics: Mutex::new(ChainMetrics::new()),
            gating: Mutex::new(BranchGating::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BaseNodeConfig, ToolNodeConfig};
    use serde_json::json;
    use tooling::register_builtin_tools;

    fn tool_node(id: &str, deps: &[&str]) -> NodeConfig {
        let mut base = BaseNodeConfig::new(id);
        base.dependencies = deps.iter().map(|d| d.to_string()).collect();
        NodeConfig::Tool(ToolNodeConfig {
            base,
            tool_name: "echo".into(),
            tool_args: json!({}),
        })
    }

    #[test]
    fn test_build_validates_structure() {
        // Cycle
        let err = Chain::builder(vec![tool_node("a", &["b"]), tool_node("b", &["a"])])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));

        // Fine
        assert!(Chain::builder(vec![tool_node("a", &[]), tool_node("b", &["a"])])
            .build()
            .is_ok());
    }

    #[test]
    fn test_unknown_tool_rejected_when_registry_present() {
        let tools = ToolRegistry::new();
        register_builtin_tools(&tools);

        let node = NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new("a"),
            tool_name: "not_a_tool".into(),
            tool_args: json!({}),
        });
        let err = Chain::builder(vec![node]).tools(tools).build().unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[test]
    fn test_no_registry_skips_tool_check() {
        let node = NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new("a"),
            tool_name: "resolved_later".into(),
            tool_args: json!({}),
        });
        assert!(Chain::builder(vec![node]).build().is_ok());
    }

    #[test]
    fn test_validate_chain_advisories() {
        let llm_node: NodeConfig = serde_json::from_value(json!({
            "type": "llm", "id": "l", "prompt_template": "hi",
            "llm_config": {"model": "gpt-4o-mini"}
        }))
        .unwrap();
        let chain = Chain::builder(vec![llm_node]).build().unwrap();
        let problems = chain.validate_chain();
        assert!(problems.iter().any(|p| p.contains("LLM service")));
    }
}
