//! Nested workflow executor
//!
//! Instantiates a sub-workflow, inline (`workflow`) or by registry name
//! (`workflow_ref`), and runs it to completion on the same engine. The
//! sub-chain shares the parent's registries, LLM service, memory, context
//! store, cache and guard callbacks, but gets an isolated execution id.
//! The node's input context becomes the sub-workflow's initial context.
//!
//! Outputs map through `exposed_outputs` (`alias → "node_id.path"`);
//! without mappings the entire per-node output map is exposed. Token usage
//! of the sub-run is rolled up onto this node so parent metrics count the
//! nested work exactly once.

use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::node::NodeConfig;
use crate::path::resolve_path;
use crate::registry::{NodeContext, NodeExecutor};
use crate::result::{NodeExecutionResult, NodeMetadata, UsageMetadata, WorkflowResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Executor for `nested_workflow` nodes
pub struct NestedWorkflowExecutor;

#[async_trait]
impl NodeExecutor for NestedWorkflowExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        node: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeExecutionResult> {
        let NodeConfig::NestedWorkflow(config) = node else {
            return Err(ChainError::config(
                "nested workflow executor received a different node kind",
            ));
        };
        let metadata = NodeMetadata::started(node);

        let spec = match (&config.workflow, &config.workflow_ref) {
            (Some(inline), _) => inline.clone(),
            (None, Some(name)) => match chain.workflows().get(name) {
                Some(spec) => spec,
                None => {
                    return Ok(NodeExecutionResult::failure(
                        metadata,
                        format!("workflow '{name}' is not registered"),
                        "ConfigError",
                    ));
                }
            },
            (None, None) => {
                // Unreachable after construction-time validation
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    "nested workflow node has no workflow reference",
                    "ConfigError",
                ));
            }
        };

        let mut builder = Chain::from_spec(spec)
            .options(chain.options.clone())
            .executors(chain.executors.clone())
            .tools(chain.tools().clone())
            .agents(chain.agents().clone())
            .workflows(chain.workflows().clone())
            .context_store(chain.context_store.clone())
            .cache(chain.cache.clone())
            .initial_context(ctx.inputs.clone());
        if let Some(service) = chain.llm_service() {
            builder = builder.llm_service(service.clone());
        }
        if let Some(memory) = chain.memory() {
            builder = builder.memory(memory.clone());
        }
        if let Some(guard) = &chain.token_guard {
            builder = builder.token_guard(guard.clone());
        }
        if let Some(guard) = &chain.depth_guard {
            builder = builder.depth_guard(guard.clone());
        }

        let sub_chain = match builder.build() {
            Ok(sub_chain) => sub_chain,
            Err(e) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    format!("failed to build nested workflow: {e}"),
                    "ConfigError",
                ));
            }
        };

        let sub_execution_id = Uuid::new_v4().to_string();
        tracing::info!(
            node = %ctx.node_id,
            sub_chain = %sub_chain.name(),
            sub_execution_id = %sub_execution_id,
            "running nested workflow"
        );

        let sub_result = match sub_chain.execute(Some(sub_execution_id)).await {
            Ok(sub_result) => sub_result,
            Err(e) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    e.to_string(),
                    e.kind_name(),
                ));
            }
        };

        let usage = rollup_usage(&sub_result, sub_chain.name(), &ctx.node_id);

        if !sub_result.success {
            let message = sub_result
                .error
                .unwrap_or_else(|| "nested workflow failed".into());
            let mut failed = NodeExecutionResult::failure(metadata, message, "ExecutorError");
            if let Some(usage) = usage {
                failed = failed.with_usage(usage);
            }
            return Ok(failed);
        }

        let output = match project_outputs(&config.exposed_outputs, &sub_result) {
            Ok(output) => output,
            Err(message) => {
                return Ok(NodeExecutionResult::failure(
                    metadata,
                    message,
                    "DependencyError",
                ));
            }
        };

        let mut result = NodeExecutionResult::success(metadata, output);
        if let Some(usage) = usage {
            result = result.with_usage(usage);
        }
        Ok(result)
    }
}

/// Map sub-workflow outputs through `exposed_outputs`; expose everything
/// when no mapping is declared
fn project_outputs(
    exposed: &std::collections::HashMap<String, String>,
    sub_result: &WorkflowResult,
) -> std::result::Result<Value, String> {
    if exposed.is_empty() {
        let mut all = Map::new();
        for (node_id, result) in &sub_result.output {
            if result.success {
                all.insert(
                    node_id.clone(),
                    result.output.clone().unwrap_or(Value::Null),
                );
            }
        }
        return Ok(Value::Object(all));
    }

    let mut projected = Map::new();
    for (alias, path) in exposed {
        let (node_id, sub_path) = match path.split_once('.') {
            Some((node_id, sub_path)) => (node_id, sub_path),
            None => (path.as_str(), ""),
        };
        let Some(node_output) = sub_result.node_output(node_id) else {
            return Err(format!(
                "exposed output '{alias}' references '{node_id}' which produced no output"
            ));
        };
        match resolve_path(node_output, sub_path) {
            Ok(value) => {
                projected.insert(alias.clone(), value.clone());
            }
            Err(e) => {
                return Err(format!("exposed output '{alias}' did not resolve: {e}"));
            }
        }
    }
    Ok(Value::Object(projected))
}

/// Roll the sub-run's token stats up into one usage record
fn rollup_usage(
    sub_result: &WorkflowResult,
    sub_name: &str,
    node_id: &str,
) -> Option<UsageMetadata> {
    let stats = &sub_result.token_stats;
    if stats.total_tokens == 0 && stats.total_cost == 0.0 {
        return None;
    }
    let (prompt, completion) = stats.per_node_usage.values().fold((0, 0), |acc, usage| {
        (acc.0 + usage.prompt_tokens, acc.1 + usage.completion_tokens)
    });
    Some(UsageMetadata {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: stats.total_tokens,
        cost: stats.total_cost,
        api_calls: stats.total_api_calls,
        model: sub_name.to_string(),
        provider: "nested_workflow".to_string(),
        node_id: node_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::cancel::CancelToken;
    use crate::node::{BaseNodeConfig, NestedWorkflowNodeConfig, ToolNodeConfig};
    use crate::registry::WorkflowRegistry;
    use crate::spec::WorkflowSpec;
    use serde_json::json;
    use std::collections::HashMap;
    use tooling::{register_builtin_tools, ToolRegistry};

    fn sub_spec() -> WorkflowSpec {
        WorkflowSpec::new(vec![NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new("inner_sum"),
            tool_name: "sum".into(),
            tool_args: json!({"numbers": [1, 2, 3]}),
        })])
        .with_name("summing")
    }

    fn nested_node(
        workflow: Option<WorkflowSpec>,
        workflow_ref: Option<&str>,
        exposed: HashMap<String, String>,
    ) -> NodeConfig {
        NodeConfig::NestedWorkflow(NestedWorkflowNodeConfig {
            base: BaseNodeConfig::new("sub"),
            workflow,
            workflow_ref: workflow_ref.map(String::from),
            exposed_outputs: exposed,
        })
    }

    fn context() -> NodeContext {
        NodeContext {
            inputs: json!({}),
            workflow_id: "wf".into(),
            execution_id: "exec".into(),
            node_id: "sub".into(),
            attempt: 0,
            results: Arc::new(HashMap::new()),
            cancel: CancelToken::never(),
        }
    }

    fn chain(node: NodeConfig, workflows: WorkflowRegistry) -> Arc<Chain> {
        let tools = ToolRegistry::new();
        register_builtin_tools(&tools);
        Arc::new(
            Chain::builder(vec![node])
                .tools(tools)
                .workflows(workflows)
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_inline_workflow_exposes_all_outputs() {
        let node = nested_node(Some(sub_spec()), None, HashMap::new());
        let chain = chain(node.clone(), WorkflowRegistry::new());

        let result = NestedWorkflowExecutor
            .execute(&chain, &node, &context())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            result.output,
            Some(json!({"inner_sum": {"sum": 6.0}}))
        );
    }

    #[tokio::test]
    async fn test_registry_reference_with_exposed_outputs() {
        let workflows = WorkflowRegistry::new();
        workflows.register("summing", sub_spec());

        let exposed: HashMap<String, String> =
            [("total".to_string(), "inner_sum.sum".to_string())].into();
        let node = nested_node(None, Some("summing"), exposed);
        let chain = chain(node.clone(), workflows);

        let result = NestedWorkflowExecutor
            .execute(&chain, &node, &context())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, Some(json!({"total": 6.0})));
    }

    #[tokio::test]
    async fn test_unregistered_reference_fails() {
        let node = nested_node(None, Some("ghost"), HashMap::new());
        let chain = chain(node.clone(), WorkflowRegistry::new());

        let result = NestedWorkflowExecutor
            .execute(&chain, &node, &context())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not registered"));
    }

    #[tokio::test]
    async fn test_failing_sub_workflow_fails_node() {
        let bad_spec = WorkflowSpec::new(vec![NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new("broken"),
            tool_name: "sum".into(),
            tool_args: json!({"numbers": "nope"}),
        })]);
        let node = nested_node(Some(bad_spec), None, HashMap::new());
        let chain = chain(node.clone(), WorkflowRegistry::new());

        let result = NestedWorkflowExecutor
            .execute(&chain, &node, &context())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("broken"));
    }

    #[tokio::test]
    async fn test_bad_exposed_path_fails() {
        let exposed: HashMap<String, String> =
            [("total".to_string(), "inner_sum.nope".to_string())].into();
        let node = nested_node(Some(sub_spec()), None, exposed);
        let chain = chain(node.clone(), WorkflowRegistry::new());

        let result = NestedWorkflowExecutor
            .execute(&chain, &node, &context())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.metadata.error_type.as_deref(),
            Some("DependencyError")
        );
    }
}
