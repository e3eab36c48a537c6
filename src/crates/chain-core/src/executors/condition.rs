//! Condition node executor
//!
//! Evaluates the node's expression against its input context with the
//! sandboxed evaluator and emits `{"result": <bool>}`. The scheduler reads
//! that field to record the branch decision that gates downstream levels.

use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::expr;
use crate::node::NodeConfig;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata};
use async_trait::async_trait;
use serde_json::json;

/// Executor for `condition` nodes
pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    async fn execute(
        &self,
        _chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Condition(config) = node else {
            return Err(ChainError::config(
                "condition executor received a non-condition node",
            ));
        };
        let metadata = NodeMetadata::started(node);

        match expr::evaluate_bool(&config.expression, &ctx.inputs) {
            Ok(decision) => {
                tracing::debug!(
                    node = %ctx.node_id,
                    expression = %config.expression,
                    decision,
                    "condition evaluated"
                );
                Ok(NodeExecutionResult::success(
                    metadata,
                    json!({ "result": decision }),
                ))
            }
            Err(e) => Ok(NodeExecutionResult::failure(
                metadata,
                e.to_string(),
                "ExpressionError",
            )),
        }
    }
}
