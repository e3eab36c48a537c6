//! LLM node executor
//!
//! Renders the prompt template, calls the injected
//! [`LlmService`](llm::LlmService) with the node's provider config and any
//! advertised tool schemas, and records token usage with cost from the
//! pricing table (unknown models cost zero). Provider errors come back as
//! failed results so the wrapper can retry transient ones.
//!
//! If the reply text parses as a JSON object it becomes the node's output
//! object (so downstream paths can navigate it); otherwise the output is
//! the raw string.

use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::node::NodeConfig;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata, UsageMetadata};
use crate::template;
use async_trait::async_trait;
use llm::{calculate_cost, ToolSchema};
use serde_json::Value;
use tooling::tool::tool_descriptor;

/// Executor for `llm` nodes
pub struct LlmExecutor;

#[async_trait]
impl NodeExecutor for LlmExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Llm(config) = node else {
            return Err(ChainError::config("llm executor received a non-llm node"));
        };
        let metadata = NodeMetadata::started(node);

        let Some(service) = chain.llm_service() else {
            return Ok(NodeExecutionResult::failure(
                metadata,
                "no LLM service configured",
                "ConfigError",
            ));
        };

        let prompt = match template::render_str(&config.prompt_template, &ctx.scope()) {
            Ok(prompt) => prompt,
            Err(e) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    format!("failed to render prompt template: {e}"),
                    "DependencyError",
                ));
            }
        };

        let tool_schemas: Vec<ToolSchema> = config
            .tools
            .iter()
            .filter_map(|name| match chain.tools().get(name) {
                Some(tool) => ToolSchema::from_descriptor(&tool_descriptor(tool.as_ref())),
                None => {
                    tracing::warn!(node = %ctx.node_id, tool = %name, "advertised tool not registered");
                    None
                }
            })
            .collect();

        if ctx.cancel.is_cancelled() {
            return Ok(NodeExecutionResult::failure(
                metadata,
                "execution cancelled",
                "Cancelled",
            ));
        }

        tracing::debug!(
            node = %ctx.node_id,
            model = %config.llm_config.model,
            provider = %config.llm_config.provider,
            "dispatching llm call"
        );

        let reply = match service
            .generate(
                &config.llm_config,
                &prompt,
                Some(&ctx.inputs),
                if tool_schemas.is_empty() {
                    None
                } else {
                    Some(&tool_schemas)
                },
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    e.to_string(),
                    "ExecutorError",
                ));
            }
        };

        let usage = UsageMetadata {
            prompt_tokens: reply.usage.prompt_tokens,
            completion_tokens: reply.usage.completion_tokens,
            total_tokens: reply.usage.total_tokens,
            cost: calculate_cost(
                config.llm_config.provider,
                &config.llm_config.model,
                reply.usage.prompt_tokens,
                reply.usage.completion_tokens,
            ),
            api_calls: 1,
            model: config.llm_config.model.clone(),
            provider: config.llm_config.provider.to_string(),
            node_id: ctx.node_id.clone(),
        };

        let output = match serde_json::from_str::<Value>(&reply.text) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(reply.text),
        };

        Ok(NodeExecutionResult::success(metadata, output).with_usage(usage))
    }
}
