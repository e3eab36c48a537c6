//! Loop node executor
//!
//! Resolves `items_source` to an array, then runs the body node set once
//! per item with `item_var` bound into the body's context. Iterations run
//! sequentially; output order is deterministic by item index. The body is
//! executed as its own sub-level decomposition, with each body node going
//! through the regular per-node wrapper.
//!
//! Output: `{"iterations": [per-iteration body outputs], "count": N}`.

use crate::chain::{Chain, DispatchMode};
use crate::error::{ChainError, Result};
use crate::node::NodeConfig;
use crate::path::resolve_path;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Executor for `loop` nodes
pub struct LoopExecutor;

#[async_trait]
impl NodeExecutor for LoopExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Loop(config) = node else {
            return Err(ChainError::config("loop executor received a non-loop node"));
        };
        let metadata = NodeMetadata::started(node);

        let items = match resolve_items_source(ctx, &config.items_source) {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    format!(
                        "items source '{}' did not resolve to an array (found {other})",
                        config.items_source
                    ),
                    "DependencyError",
                ));
            }
            Err(message) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    message,
                    "DependencyError",
                ));
            }
        };

        if items.len() as u32 > config.max_iterations {
            tracing::warn!(
                node = %ctx.node_id,
                items = items.len(),
                max_iterations = config.max_iterations,
                "item list exceeds max_iterations; truncating"
            );
        }

        let mut iterations: Vec<Value> = Vec::new();
        for (index, item) in items
            .iter()
            .take(config.max_iterations as usize)
            .enumerate()
        {
            if ctx.cancel.is_cancelled() {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    "execution cancelled",
                    "Cancelled",
                )
                .with_output(json!({"iterations": iterations, "count": index})));
            }

            // Child scope: the loop's own inputs plus the bound item
            let mut scope = ctx
                .inputs
                .as_object()
                .cloned()
                .unwrap_or_default();
            scope.insert(config.item_var.clone(), item.clone());
            let extra = Value::Object(scope);

            let body_results = chain
                .execute_subgraph(
                    &config.body_node_ids,
                    ctx.results.as_ref(),
                    Some(&extra),
                    &ctx.execution_id,
                    &ctx.cancel,
                    chain.options.max_parallel,
                    DispatchMode::Wrapped,
                )
                .await;

            let mut outputs = Map::new();
            for body_id in &config.body_node_ids {
                match body_results.get(body_id) {
                    Some(result) if result.success => {
                        outputs.insert(
                            body_id.clone(),
                            result.output.clone().unwrap_or(Value::Null),
                        );
                    }
                    Some(result) => {
                        let message = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "unknown error".into());
                        return Ok(NodeExecutionResult::failure(
                            metadata,
                            format!("iteration {index}: node '{body_id}' failed: {message}"),
                            "ExecutorError",
                        )
                        .with_output(json!({"iterations": iterations, "count": index})));
                    }
                    None => {
                        return Ok(NodeExecutionResult::failure(
                            metadata,
                            format!("iteration {index}: node '{body_id}' produced no result"),
                            "ExecutorError",
                        )
                        .with_output(json!({"iterations": iterations, "count": index})));
                    }
                }
            }
            iterations.push(Value::Object(outputs));
        }

        let count = iterations.len();
        Ok(NodeExecutionResult::success(
            metadata,
            json!({ "iterations": iterations, "count": count }),
        ))
    }
}

/// Resolve an items-source path: `<node_id>.<path>` against accumulated
/// results, falling back to the node's own input context
fn resolve_items_source(ctx: &NodeContext, source: &str) -> std::result::Result<Value, String> {
    let (first, rest) = match source.split_once('.') {
        Some((first, rest)) => (first, rest),
        None => (source, ""),
    };

    if let Some(result) = ctx.results.get(first) {
        let output = result
            .output
            .as_ref()
            .ok_or_else(|| format!("node '{first}' produced no output"))?;
        return resolve_path(output, rest)
            .map(Value::clone)
            .map_err(|e| e.to_string());
    }

    resolve_path(&ctx.inputs, source)
        .map(Value::clone)
        .map_err(|e| e.to_string())
}
