//! Recursive node executor
//!
//! Maintains a named state initialized from `initial_state` and iterates
//! the body up to `max_iterations` times:
//!
//! 1. evaluate `convergence_expression` over the state (the state fields
//!    are in scope directly, plus `state` and `iteration`); truthy → done;
//! 2. run the body with the current state bound to the reserved `state`
//!    placeholder;
//! 3. fold updated state fields out of the body outputs (a body node
//!    output object carrying a state-variable key overwrites it).
//!
//! Iteration bodies are dispatched directly, outside the per-node wrapper:
//! retry/cache/validation belong to the outer recursive node, and caching
//! an iteration would alias distinct loop states onto one key.
//!
//! Output: `{"final_state", "converged", "current_iteration",
//! "consensus_score"?, "conversation_history"?}`. Non-convergence is not a
//! failure; the caller (commonly a downstream condition) decides what to
//! do with `converged = false`.

use crate::chain::{Chain, DispatchMode};
use crate::error::{ChainError, Result};
use crate::expr;
use crate::node::NodeConfig;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Executor for `recursive` nodes
pub struct RecursiveExecutor;

#[async_trait]
impl NodeExecutor for RecursiveExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Recursive(config) = node else {
            return Err(ChainError::config(
                "recursive executor received a non-recursive node",
            ));
        };
        let metadata = NodeMetadata::started(node);

        let mut state: Map<String, Value> = config.initial_state.clone();
        let mut conversation_history: Vec<Value> = Vec::new();
        let mut iterations_run: u32 = 0;
        let mut converged = false;

        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    "execution cancelled",
                    "Cancelled",
                ));
            }

            // Convergence check over the current state
            let mut scope = state.clone();
            scope.insert("state".into(), Value::Object(state.clone()));
            scope.insert("iteration".into(), json!(iterations_run));
            match expr::evaluate_bool(&config.convergence_expression, &Value::Object(scope)) {
                Ok(true) => {
                    converged = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    return Ok(NodeExecutionResult::failure(
                        metadata,
                        format!("convergence expression failed: {e}"),
                        "ExpressionError",
                    ));
                }
            }

            if iterations_run >= config.max_iterations {
                tracing::warn!(
                    node = %ctx.node_id,
                    max_iterations = config.max_iterations,
                    "recursion did not converge"
                );
                break;
            }

            // Body scope: the node's inputs plus the reserved bindings
            let mut extra = ctx.inputs.as_object().cloned().unwrap_or_default();
            extra.insert("state".into(), Value::Object(state.clone()));
            extra.insert("iteration".into(), json!(iterations_run));

            let body_results = chain
                .execute_subgraph(
                    &config.body_node_ids,
                    ctx.results.as_ref(),
                    Some(&Value::Object(extra)),
                    &ctx.execution_id,
                    &ctx.cancel,
                    chain.options.max_parallel,
                    DispatchMode::Direct,
                )
                .await;

            let mut iteration_outputs = Map::new();
            for body_id in &config.body_node_ids {
                match body_results.get(body_id) {
                    Some(result) if result.success => {
                        let output = result.output.clone().unwrap_or(Value::Null);
                        // Fold state-variable fields out of the body output
                        if let Value::Object(fields) = &output {
                            for key in config.initial_state.keys() {
                                if let Some(updated) = fields.get(key) {
                                    state.insert(key.clone(), updated.clone());
                                }
                            }
                        }
                        iteration_outputs.insert(body_id.clone(), output);
                    }
                    Some(result) => {
                        let message = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "unknown error".into());
                        return Ok(NodeExecutionResult::failure(
                            metadata,
                            format!(
                                "iteration {iterations_run}: node '{body_id}' failed: {message}"
                            ),
                            "ExecutorError",
                        )
                        .with_output(json!({
                            "final_state": state,
                            "converged": false,
                            "current_iteration": iterations_run,
                        })));
                    }
                    None => {
                        return Ok(NodeExecutionResult::failure(
                            metadata,
                            format!(
                                "iteration {iterations_run}: node '{body_id}' produced no result"
                            ),
                            "ExecutorError",
                        ));
                    }
                }
            }

            if config.preserve_context {
                conversation_history.push(json!({
                    "iteration": iterations_run,
                    "outputs": Value::Object(iteration_outputs),
                }));
            }
            iterations_run += 1;
        }

        let mut output = Map::new();
        output.insert("final_state".into(), Value::Object(state.clone()));
        output.insert("converged".into(), Value::Bool(converged));
        output.insert("current_iteration".into(), json!(iterations_run));
        if let Some(score) = state.get("consensus_score") {
            output.insert("consensus_score".into(), score.clone());
        }
        if config.preserve_context {
            output.insert(
                "conversation_history".into(),
                Value::Array(conversation_history),
            );
        }

        Ok(NodeExecutionResult::success(metadata, Value::Object(output)))
    }
}
