//! Agent node executor
//!
//! Resolves the node's `package` through the agent registry, merges tool
//! permissions, then runs a bounded reason–act loop:
//!
//! 1. the conversation so far is rendered into one prompt and sent to the
//!    LLM along with the permitted tool schemas;
//! 2. a reply parsing as `{"tool_name": ..., "arguments": {...}}` invokes
//!    that tool and feeds the result back into the conversation;
//! 3. any other reply is the final answer.
//!
//! A tool call repeating with identical arguments short-circuits the loop
//! with the previously observed result: the model is looping, more rounds
//! will not help. `max_rounds` (default 2) bounds the loop either way.
//! Usage is accumulated across rounds.
//!
//! Tool permissions merge most-specific-last: the registry's global tool
//! set, narrowed by the agent definition's allow-list, narrowed again by
//! the node-level allow-list.

use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::memory::{MemoryScope, MemoryStore};
use crate::node::NodeConfig;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata, UsageMetadata};
use async_trait::async_trait;
use llm::{calculate_cost, LlmReply, TokenUsage, ToolSchema};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tooling::tool::tool_descriptor;
use tooling::Tool;

/// Executor for `agent` nodes
pub struct AgentExecutor;

#[async_trait]
impl NodeExecutor for AgentExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::Agent(config) = node else {
            return Err(ChainError::config("agent executor received a non-agent node"));
        };
        let metadata = NodeMetadata::started(node);

        let Some(service) = chain.llm_service() else {
            return Ok(NodeExecutionResult::failure(
                metadata,
                "no LLM service configured",
                "ConfigError",
            ));
        };
        let Some(mut definition) = chain.agents().get(&config.package) else {
            return Ok(NodeExecutionResult::failure(
                metadata,
                format!("agent package '{}' is not registered", config.package),
                "ConfigError",
            ));
        };

        // Node-level overrides on top of the registered definition
        if let Some(overrides) = &config.agent_config {
            if let Some(instructions) = &overrides.instructions {
                definition.instructions = instructions.clone();
            }
            if let Some(model) = &overrides.model {
                definition.llm_config.model = model.clone();
            }
            if let Some(temperature) = overrides.temperature {
                definition.llm_config.temperature = temperature;
            }
            if let Some(max_rounds) = overrides.max_rounds {
                definition.max_rounds = max_rounds.max(1);
            }
        }

        let tools = permitted_tools(chain, &definition.allowed_tools, &config.base.allowed_tools);
        let tool_schemas: Vec<ToolSchema> = tools
            .values()
            .filter_map(|tool| ToolSchema::from_descriptor(&tool_descriptor(tool.as_ref())))
            .collect();

        let mut conversation: Vec<(String, String)> = vec![
            ("system".into(), definition.instructions.clone()),
            ("user".into(), ctx.inputs.to_string()),
        ];

        let mut aggregate = TokenUsage::default();
        let mut rounds_used: u32 = 0;
        let mut tool_result_cache: HashMap<String, Value> = HashMap::new();
        let mut final_output: Option<Value> = None;

        for round in 0..definition.max_rounds {
            if ctx.cancel.is_cancelled() {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    "execution cancelled",
                    "Cancelled",
                ));
            }

            let prompt = render_conversation(&conversation);
            let reply: LlmReply = match service
                .generate(
                    &definition.llm_config,
                    &prompt,
                    None,
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
                    let result = NodeExecutionResult::failure(
                        metadata,
                        e.to_string(),
                        "ExecutorError",
                    );
                    // Rounds already spent still count toward usage
                    return Ok(result.with_usage(usage_metadata(
                        &aggregate,
                        &definition.llm_config,
                        rounds_used,
                        &ctx.node_id,
                    )));
                }
            };
            aggregate.add(&reply.usage);
            rounds_used = round + 1;

            let Ok(payload) = serde_json::from_str::<Value>(&reply.text) else {
                // Raw text is the final answer
                final_output = Some(Value::String(reply.text));
                break;
            };

            let Some(tool_name) = payload.get("tool_name").and_then(Value::as_str) else {
                // JSON but not a tool call: structured final answer
                final_output = Some(payload);
                break;
            };
            let arguments = payload.get("arguments").cloned().unwrap_or(json!({}));

            let call_key = format!(
                "{tool_name}:{}",
                tooling::serialization::stable_json_string(&arguments)
                    .unwrap_or_else(|_| arguments.to_string())
            );
            if let Some(previous) = tool_result_cache.get(&call_key) {
                tracing::warn!(
                    node = %ctx.node_id,
                    tool = %tool_name,
                    "repeated tool invocation detected, aborting loop"
                );
                final_output = Some(previous.clone());
                break;
            }

            let Some(tool) = tools.get(tool_name) else {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    format!("agent requested tool '{tool_name}' outside its permissions"),
                    "ConfigError",
                )
                .with_usage(usage_metadata(
                    &aggregate,
                    &definition.llm_config,
                    rounds_used,
                    &ctx.node_id,
                )));
            };

            tracing::debug!(node = %ctx.node_id, tool = %tool_name, round, "agent tool call");
            let tool_result = match tool.run(arguments).await {
                Ok(result) => result,
                Err(e) => {
                    return Ok(NodeExecutionResult::failure(
                        metadata,
                        format!("Tool '{tool_name}' failed: {e}"),
                        "ToolError",
                    )
                    .with_usage(usage_metadata(
                        &aggregate,
                        &definition.llm_config,
                        rounds_used,
                        &ctx.node_id,
                    )));
                }
            };

            tool_result_cache.insert(call_key, tool_result.clone());
            conversation.push(("assistant".into(), reply.text));
            conversation.push(("tool".into(), tool_result.to_string()));
        }

        let output = final_output.unwrap_or(Value::Null);

        if config.enable_memory {
            if let Some(memory) = chain.memory() {
                memory
                    .store(
                        MemoryScope::Episodic,
                        &format!("{}:{}", ctx.node_id, ctx.execution_id),
                        json!({"input": ctx.inputs, "output": output}),
                        None,
                    )
                    .await;
            }
        }

        let usage = usage_metadata(&aggregate, &definition.llm_config, rounds_used, &ctx.node_id);
        Ok(NodeExecutionResult::success(metadata, output).with_usage(usage))
    }
}

/// Global registry tools narrowed by the definition's allow-list, then the
/// node's allow-list
fn permitted_tools(
    chain: &Chain,
    definition_allowed: &Option<Vec<String>>,
    node_allowed: &Option<Vec<String>>,
) -> HashMap<String, Arc<dyn Tool>> {
    let mut tools: HashMap<String, Arc<dyn Tool>> = chain
        .tools()
        .all()
        .into_iter()
        .map(|tool| (tool.name().to_string(), tool))
        .collect();
    for allow_list in [definition_allowed, node_allowed].into_iter().flatten() {
        tools.retain(|name, _| allow_list.iter().any(|allowed| allowed == name));
    }
    tools
}

fn render_conversation(conversation: &[(String, String)]) -> String {
    conversation
        .iter()
        .map(|(role, content)| format!("{}: {content}", role.to_uppercase()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn usage_metadata(
    aggregate: &TokenUsage,
    llm_config: &llm::LlmConfig,
    api_calls: u32,
    node_id: &str,
) -> UsageMetadata {
    UsageMetadata {
        prompt_tokens: aggregate.prompt_tokens,
        completion_tokens: aggregate.completion_tokens,
        total_tokens: aggregate.total_tokens,
        cost: calculate_cost(
            llm_config.provider,
            &llm_config.model,
            aggregate.prompt_tokens,
            aggregate.completion_tokens,
        ),
        api_calls,
        model: llm_config.model.clone(),
        provider: llm_config.provider.to_string(),
        node_id: node_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::memory::InMemoryMemory;
    use crate::node::{AgentNodeConfig, BaseNodeConfig};
    use crate::registry::{AgentDefinition, AgentRegistry};
    use llm::{LlmConfig, MockLlm, Provider};
    use tooling::{register_builtin_tools, ToolRegistry};

    fn agent_node(package: &str, enable_memory: bool) -> NodeConfig {
        NodeConfig::Agent(AgentNodeConfig {
            base: BaseNodeConfig::new("a"),
            package: package.into(),
            agent_config: None,
            enable_memory,
        })
    }

    fn context(inputs: Value) -> NodeContext {
        NodeContext {
            inputs,
            workflow_id: "wf".into(),
            execution_id: "exec".into(),
            node_id: "a".into(),
            attempt: 0,
            results: Arc::new(HashMap::new()),
            cancel: CancelToken::never(),
        }
    }

    fn registry_with(name: &str, max_rounds: u32) -> AgentRegistry {
        let agents = AgentRegistry::new();
        agents.register(
            name,
            AgentDefinition::new(
                "You add numbers",
                LlmConfig::new(Provider::OpenAi, "gpt-4o-mini"),
            )
            .with_max_rounds(max_rounds),
        );
        agents
    }

    fn chain_with(mock: MockLlm, agents: AgentRegistry, memory: bool) -> Arc<Chain> {
        let tools = ToolRegistry::new();
        register_builtin_tools(&tools);
        let mut builder = Chain::builder(vec![agent_node("adder", false)])
            .tools(tools)
            .agents(agents)
            .llm_service(Arc::new(mock));
        if memory {
            builder = builder.memory(Arc::new(InMemoryMemory::new()));
        }
        Arc::new(builder.build().unwrap())
    }

    #[tokio::test]
    async fn test_tool_call_then_final_answer() {
        let mock = MockLlm::new();
        mock.push_reply(
            r#"{"tool_name": "sum", "arguments": {"numbers": [2, 3]}}"#,
            TokenUsage::new(40, 10),
        );
        mock.push_reply("The sum is 5", TokenUsage::new(60, 5));

        let chain = chain_with(mock, registry_with("adder", 2), false);
        let result = AgentExecutor
            .execute(&chain, &agent_node("adder", false), &context(json!({"task": "add"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, Some(json!("The sum is 5")));
        let usage = result.usage.unwrap();
        assert_eq!(usage.total_tokens, 115);
        assert_eq!(usage.api_calls, 2);
    }

    #[tokio::test]
    async fn test_repeated_tool_call_aborts_with_cached_result() {
        let mock = MockLlm::new();
        // The model asks for the identical call three times
        for _ in 0..3 {
            mock.push_reply(
                r#"{"tool_name": "sum", "arguments": {"numbers": [1, 1]}}"#,
                TokenUsage::new(10, 5),
            );
        }

        let chain = chain_with(mock, registry_with("adder", 5), false);
        let result = AgentExecutor
            .execute(&chain, &agent_node("adder", false), &context(json!({})))
            .await
            .unwrap();

        assert!(result.success);
        // Final answer is the cached tool result
        assert_eq!(result.output, Some(json!({"sum": 2.0})));
        // round 1 called the tool, round 2 hit the repeat guard
        assert_eq!(result.usage.unwrap().api_calls, 2);
    }

    #[tokio::test]
    async fn test_unknown_package_fails() {
        let mock = MockLlm::replying("hi", TokenUsage::new(1, 1));
        let chain = chain_with(mock, registry_with("adder", 2), false);

        let result = AgentExecutor
            .execute(&chain, &agent_node("ghost", false), &context(json!({})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not registered"));
    }

    #[tokio::test]
    async fn test_disallowed_tool_fails() {
        let mock = MockLlm::new();
        mock.push_reply(
            r#"{"tool_name": "sleep", "arguments": {"seconds": 1}}"#,
            TokenUsage::new(5, 5),
        );

        let agents = AgentRegistry::new();
        agents.register(
            "adder",
            AgentDefinition::new(
                "You add numbers",
                LlmConfig::new(Provider::OpenAi, "gpt-4o-mini"),
            )
            .with_allowed_tools(vec!["sum".into()]),
        );

        let chain = chain_with(mock, agents, false);
        let result = AgentExecutor
            .execute(&chain, &agent_node("adder", false), &context(json!({})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("outside its permissions"));
    }

    #[tokio::test]
    async fn test_structured_final_answer() {
        let mock = MockLlm::replying(r#"{"verdict": "ok"}"#, TokenUsage::new(5, 5));
        let chain = chain_with(mock, registry_with("adder", 2), false);

        let result = AgentExecutor
            .execute(&chain, &agent_node("adder", false), &context(json!({})))
            .await
            .unwrap();
        assert_eq!(result.output, Some(json!({"verdict": "ok"})));
    }

    #[tokio::test]
    async fn test_memory_written_when_enabled() {
        let mock = MockLlm::replying("done", TokenUsage::new(5, 5));
        let tools = ToolRegistry::new();
        register_builtin_tools(&tools);
        let memory = Arc::new(InMemoryMemory::new());
        let chain = Arc::new(
            Chain::builder(vec![agent_node("adder", true)])
                .tools(tools)
                .agents(registry_with("adder", 2))
                .llm_service(Arc::new(mock))
                .memory(memory.clone())
                .build()
                .unwrap(),
        );

        let result = AgentExecutor
            .execute(&chain, &agent_node("adder", true), &context(json!({})))
            .await
            .unwrap();
        assert!(result.success);

        let entry = memory
            .retrieve(MemoryScope::Episodic, "a:exec")
            .await
            .unwrap();
        assert_eq!(entry.content["output"], json!("done"));
    }
}
