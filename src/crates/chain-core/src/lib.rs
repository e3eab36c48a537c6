//! chain-core: a level-parallel DAG workflow engine for AI agent pipelines
//!
//! A workflow is a directed acyclic graph of heterogeneous nodes:
//! deterministic tools, LLM calls, reasoning agents, branching conditions,
//! loops, parallel fan-outs, recursive refinement and nested sub-workflows.
//! The engine validates the graph, decomposes it into topological levels,
//! and executes each level concurrently under weighted admission, with
//! per-node retry/backoff/timeout, result caching, output validation,
//! branch gating, and token/depth guardrails.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Chain (entry point)                                          │
//! │  • per-level scheduling, guards, failure policy, metrics      │
//! └───────┬───────────────────────────────────────────────────────┘
//!         │ per node
//! ┌───────▼───────────────────────────────────────────────────────┐
//! │  Runner (cross-cutting wrapper)                               │
//! │  • context build  • cache (single-flight)  • retry/backoff    │
//! │  • timeout scope  • output aliases  • schema validation       │
//! └───────┬───────────────────────────────────────────────────────┘
//!         │ dispatch by kind
//! ┌───────▼───────────────────────────────────────────────────────┐
//! │  Executors: tool · llm · agent · condition · loop · parallel  │
//! │             recursive · nested_workflow                       │
//! └───────┬───────────────────────────────────────────────────────┘
//!         │ via injected interfaces
//! ┌───────▼───────────────────────────────────────────────────────┐
//! │  ToolRegistry · LlmService · AgentRegistry · MemoryStore      │
//! │  ContextStore · ResultCache · guard callbacks                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use chain_core::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> chain_core::error::Result<()> {
//! let spec = WorkflowSpec::from_value(json!({
//!     "version": "1.0.0",
//!     "nodes": [
//!         {"type": "tool", "id": "total", "tool_name": "sum",
//!          "tool_args": {"numbers": [1, 2, 3]}}
//!     ]
//! }))?;
//!
//! let tools = tooling::ToolRegistry::new();
//! tooling::register_builtin_tools(&tools);
//!
//! let chain = Arc::new(Chain::from_spec(spec).tools(tools).build()?);
//! let result = chain.execute(None).await?;
//!
//! assert!(result.success);
//! assert_eq!(result.node_output("total"), Some(&json!({"sum": 6.0})));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cancel;
pub mod chain;
pub mod context;
pub mod error;
pub mod executors;
pub mod expr;
pub mod gating;
pub mod graph;
pub mod guard;
pub mod memory;
pub mod metrics;
pub mod node;
pub mod path;
pub mod registry;
pub mod result;
pub mod runner;
pub mod sem;
pub mod spec;
pub mod template;
pub mod validation;

pub use cache::{InMemoryResultCache, ResultCache};
pub use cancel::{CancelHandle, CancelToken};
pub use chain::{Chain, ChainBuilder};
pub use context::{ContextStore, InMemoryContextStore};
pub use error::{ChainError, Result};
pub use guard::{ChainOptions, DepthGuard, FailurePolicy, TokenGuard};
pub use memory::{InMemoryMemory, MemoryScope, MemoryStore};
pub use node::{NodeConfig, NodeKind};
pub use registry::{AgentDefinition, AgentRegistry, ExecutorRegistry, NodeContext, NodeExecutor, WorkflowRegistry};
pub use result::{NodeExecutionResult, TokenStats, UsageMetadata, WorkflowResult};
pub use spec::WorkflowSpec;

/// Commonly used types in one import
pub mod prelude {
    pub use crate::chain::{Chain, ChainBuilder};
    pub use crate::error::{ChainError, Result};
    pub use crate::guard::{ChainOptions, FailurePolicy};
    pub use crate::node::{NodeConfig, NodeKind};
    pub use crate::registry::{AgentDefinition, AgentRegistry, WorkflowRegistry};
    pub use crate::result::{NodeExecutionResult, WorkflowResult};
    pub use crate::spec::WorkflowSpec;
}
