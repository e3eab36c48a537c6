//! Parallel node executor
//!
//! Runs each branch (an inner mini-DAG of node ids) concurrently.
//! Branch admission is bounded by the node's `max_concurrency` (and the
//! engine's `max_parallel`); nodes inside a branch are additionally
//! admitted through the branch's own weighted limiter. A branch failure
//! marks that branch failed without cancelling its siblings; the parallel
//! node itself fails if any branch did, with the per-branch output map
//! attached either way.
//!
//! Output: `{"<branch_id>": <last-node output>}` per branch.

use crate::chain::{Chain, DispatchMode};
use crate::error::{ChainError, Result};
use crate::node::NodeConfig;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Executor for `parallel` nodes
pub struct ParallelExecutor;

#[async_trait]
impl NodeExecutor for ParallelExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Parallel(config) = node else {
            return Err(ChainError::config(
                "parallel executor received a non-parallel node",
            ));
        };
        let metadata = NodeMetadata::started(node);

        let branch_limit = config
            .max_concurrency
            .unwrap_or(chain.options.max_parallel)
            .clamp(1, chain.options.max_parallel.max(1));
        let admission = Arc::new(Semaphore::new(branch_limit));

        let branch_runs = config.branches.iter().map(|branch| {
            let admission = Arc::clone(&admission);
            let ctx = ctx.clone();
            let branch_id = branch.id.clone();
            let node_ids = branch.node_ids.clone();
            async move {
                let _permit = admission
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                let results = chain
                    .execute_subgraph(
                        &node_ids,
                        ctx.results.as_ref(),
                        Some(&ctx.inputs),
                        &ctx.execution_id,
                        &ctx.cancel,
                        chain.options.max_parallel,
                        DispatchMode::Wrapped,
                    )
                    .await;

                // The branch value is its last declared node's output
                let last_id = node_ids.last().expect("branches are non-empty");
                let outcome = match results.get(last_id) {
                    Some(result) if result.success => {
                        Ok(result.output.clone().unwrap_or(Value::Null))
                    }
                    Some(result) => Err(result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".into())),
                    None => Err(format!("branch node '{last_id}' produced no result")),
                };
                (branch_id, outcome)
            }
        });

        let outcomes = join_all(branch_runs).await;

        let mut output = Map::new();
        let mut failed_branches: Vec<String> = Vec::new();
        for (branch_id, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    output.insert(branch_id, value);
                }
                Err(message) => {
                    tracing::warn!(branch = %branch_id, error = %message, "parallel branch failed");
                    failed_branches.push(format!("branch '{branch_id}': {message}"));
                    output.insert(branch_id, json!({"success": false, "error": message}));
                }
            }
        }

        if failed_branches.is_empty() {
            Ok(NodeExecutionResult::success(metadata, Value::Object(output)))
        } else {
            Ok(NodeExecutionResult::failure(
                metadata,
                failed_branches.join("; "),
                "ExecutorError",
            )
            .with_output(Value::Object(output)))
        }
    }
}
