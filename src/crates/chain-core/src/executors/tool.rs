//! Tool node executor
//!
//! Renders `tool_args` templates against the node's scope (input context
//! plus `result.<node_id>.<path>`), resolves the named tool through the
//! registry and invokes it. Tool errors become failed results with
//! `error_type = "ToolError"`.

use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::node::NodeConfig;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata};
use crate::template;
use async_trait::async_trait;
use serde_json::Value;

/// Executor for `tool` nodes
pub struct ToolExecutor;

#[async_trait]
impl NodeExecutor for ToolExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Tool(config) = node else {
            return Err(ChainError::config("tool executor received a non-tool node"));
        };
        let metadata = NodeMetadata::started(node);

        if let Some(allowed) = &config.base.allowed_tools {
            if !allowed.iter().any(|name| name == &config.tool_name) {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    format!(
                        "tool '{}' is not in this node's allow-list",
                        config.tool_name
                    ),
                    "ConfigError",
                ));
            }
        }

        let Some(tool) = chain.tools().get(&config.tool_name) else {
            return Ok(NodeExecutionResult::failure(
                metadata,
                format!("tool '{}' is not registered", config.tool_name),
                "ConfigError",
            ));
        };

        let args = match template::render_value(&config.tool_args, &ctx.scope()) {
            Ok(Value::Null) => Value::Object(serde_json::Map::new()),
            Ok(args) => args,
            Err(e) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    format!("failed to render tool arguments: {e}"),
                    "DependencyError",
                ));
            }
        };

        if ctx.cancel.is_cancelled() {
            return Ok(NodeExecutionResult::failure(
                metadata,
                "execution cancelled",
                "Cancelled",
            ));
        }

        tracing::debug!(node = %ctx.node_id, tool = %config.tool_name, "invoking tool");
        match tool.run(args).await {
            Ok(output) => Ok(NodeExecutionResult::success(metadata, output)),
            Err(e) => Ok(NodeExecutionResult::failure(
                metadata,
                e.to_string(),
                "ToolError",
            )),
        }
    }
}
