//! Per-node execution wrapper
//!
//! Every scheduled node passes through [`execute_node`], which applies the
//! cross-cutting policy around the type-specific executor, in order:
//!
//! 1. build the input context (mapping resolution + input-schema coercion);
//!    failures here are non-retryable and skip the executor entirely
//! 2. persist the input context to the context store
//! 3. cache lookup under a single-flight lock (one build per key at a time)
//! 4. the attempt loop: timeout scope → executor → on success annotate
//!    retry count, apply output aliases, persist output, validate the
//!    output schema (a validation failure demotes the result and is
//!    non-retryable), store in cache; on failure sleep
//!    `backoff · 2^attempt` and retry while attempts remain
//! 5. exhaustion: a failed result carrying the last error
//!
//! The wrapper never returns `Err`: executor errors become failed results
//! so sibling nodes keep running, and the chain entry point re-raises
//! under the HALT policy from the recorded failure.

use crate::cancel::CancelToken;
use crate::chain::Chain;
use crate::context::{apply_input_schema, build_node_context};
use crate::node::NodeConfig;
use crate::path::resolve_path;
use crate::registry::NodeContext;
use crate::result::{NodeExecutionResult, NodeMetadata};
use crate::validation::validate_output;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Execute a node through the full wrapper
pub(crate) async fn execute_node(
    chain: &Chain,
    node: &NodeConfig,
    snapshot: Arc<HashMap<String, NodeExecutionResult>>,
    execution_id: &str,
    cancel: CancelToken,
    initial_context: Option<Value>,
) -> NodeExecutionResult {
    let node_id = node.id();

    // 1. Input context; a broken mapping fails the node without invoking
    //    the executor and without retries
    let inputs = match build_node_context(node, &snapshot, initial_context.as_ref())
        .and_then(|ctx| apply_input_schema(node, ctx))
    {
        Ok(inputs) => inputs,
        Err(e) => {
            tracing::warn!(node = %node_id, error = %e, "context build failed");
            return NodeExecutionResult::failure(
                NodeMetadata::started(node),
                e.to_string(),
                e.kind_name(),
            );
        }
    };

    // 2. Record the input context
    chain
        .context_store
        .put(node_id, execution_id, inputs.clone())
        .await;

    let mut ctx = NodeContext {
        inputs,
        workflow_id: chain.workflow_id().to_string(),
        execution_id: execution_id.to_string(),
        node_id: node_id.to_string(),
        attempt: 0,
        results: snapshot,
        cancel: cancel.clone(),
    };

    // 3. Cache lookup behind a single-flight lock. The guard stays alive
    //    for the rest of the call so concurrent tasks with the same key
    //    wait for this build instead of duplicating it.
    let caching = chain.options.use_cache && node.base().use_cache;
    let key = if caching {
        crate::cache::cache_key(node, &ctx.inputs)
    } else {
        None
    };
    let _flight = match &key {
        Some(key) => {
            let guard = chain.flights.lock(key).await;
            if let Some(cached) = chain.cache.get(key).await {
                tracing::debug!(node = %node_id, "cache hit");
                return cached;
            }
            Some(guard)
        }
        None => None,
    };

    // 4. Attempt loop
    let max_retries = node.base().retries;
    let base_backoff = node.base().backoff_seconds;
    let mut last_error: Option<(String, String)> = None; // (message, error_type)

    for attempt in 0..=max_retries {
        if cancel.is_cancelled() {
            return NodeExecutionResult::failure(
                NodeMetadata::started(node),
                "execution cancelled",
                "Cancelled",
            );
        }
        ctx.attempt = attempt;

        let executor = match chain.executors.get(node.kind()) {
            Ok(executor) => executor,
            Err(e) => {
                return NodeExecutionResult::failure(
                    NodeMetadata::started(node),
                    e.to_string(),
                    e.kind_name(),
                )
            }
        };

        let invocation = executor.execute(chain, node, &ctx);
        let outcome = match node.base().timeout_seconds {
            Some(seconds) => {
                match tokio::time::timeout(Duration::from_secs(seconds), invocation).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(node = %node_id, seconds, attempt, "node timed out");
                        last_error = Some((
                            format!("execution exceeded timeout of {seconds}s"),
                            "Timeout".to_string(),
                        ));
                        if attempt < max_retries {
                            if !backoff_sleep(base_backoff, attempt, &cancel).await {
                                return cancelled_result(node);
                            }
                        }
                        continue;
                    }
                }
            }
            None => invocation.await,
        };

        match outcome {
            Ok(mut result) if result.success => {
                result.metadata.retry_count = attempt;
                result.context_used = Some(ctx.inputs.clone());

                apply_output_mappings(node, &mut result);

                if chain.options.persist_intermediate_outputs {
                    if let Some(output) = &result.output {
                        chain
                            .context_store
                            .put(node_id, execution_id, output.clone())
                            .await;
                    }
                }

                // Output validation demotes the result; deterministic, so
                // no retry and no cache store
                if chain.options.validate_outputs {
                    if let Some(schema) = &node.base().output_schema {
                        let output = result.output.clone().unwrap_or(Value::Null);
                        let problems = validate_output(schema, &output);
                        if !problems.is_empty() {
                            let message = format!(
                                "Output validation failed for node '{node_id}' against \
                                 declared schema: {}",
                                problems.join("; ")
                            );
                            tracing::warn!(node = %node_id, %message, "output rejected");
                            result.success = false;
                            result.metadata.error_type = Some("ValidationError".to_string());
                            result.error = Some(match result.error.take() {
                                Some(existing) => format!("{existing}; {message}"),
                                None => message,
                            });
                            return result;
                        }
                    }
                }

                if let Some(key) = &key {
                    chain.cache.set(key, result.clone()).await;
                }
                return result;
            }
            Ok(result) => {
                let message = result.error.clone().unwrap_or_else(|| "unknown error".into());
                let error_type = result
                    .metadata
                    .error_type
                    .clone()
                    .unwrap_or_else(|| "ExecutorError".to_string());
                tracing::warn!(node = %node_id, attempt, error = %message, "node attempt failed");
                last_error = Some((message, error_type));
            }
            Err(e) if !e.is_retryable() => {
                return NodeExecutionResult::failure(
                    NodeMetadata::started(node),
                    e.to_string(),
                    e.kind_name(),
                );
            }
            Err(e) => {
                tracing::warn!(node = %node_id, attempt, error = %e, "node attempt errored");
                last_error = Some((e.to_string(), e.kind_name().to_string()));
            }
        }

        if attempt < max_retries && !backoff_sleep(base_backoff, attempt, &cancel).await {
            return cancelled_result(node);
        }
    }

    // 5. Exhaustion
    let (message, error_type) =
        last_error.unwrap_or_else(|| ("unknown error".into(), "UnknownError".into()));
    let mut metadata = NodeMetadata::started(node);
    metadata.retry_count = max_retries;
    NodeExecutionResult::failure(
        metadata,
        format!("Retry limit exceeded ({max_retries}) – last error: {message}"),
        error_type,
    )
}

/// Dispatch a node straight to its executor, without retry, cache,
/// persistence or validation
///
/// Recursive iteration bodies run through here: the outer recursive node's
/// wrapper already owns those policies, and caching an individual
/// iteration would alias distinct loop states onto one key.
pub(crate) async fn dispatch_node(
    chain: &Chain,
    node: &NodeConfig,
    snapshot: Arc<HashMap<String, NodeExecutionResult>>,
    execution_id: &str,
    cancel: CancelToken,
    initial_context: Option<Value>,
) -> NodeExecutionResult {
    let inputs = match build_node_context(node, &snapshot, initial_context.as_ref())
        .and_then(|ctx| apply_input_schema(node, ctx))
    {
        Ok(inputs) => inputs,
        Err(e) => {
            return NodeExecutionResult::failure(
                NodeMetadata::started(node),
                e.to_string(),
                e.kind_name(),
            )
        }
    };

    let ctx = NodeContext {
        inputs,
        workflow_id: chain.workflow_id().to_string(),
        execution_id: execution_id.to_string(),
        node_id: node.id().to_string(),
        attempt: 0,
        results: snapshot,
        cancel,
    };

    let executor = match chain.executors.get(node.kind()) {
        Ok(executor) => executor,
        Err(e) => {
            return NodeExecutionResult::failure(
                NodeMetadata::started(node),
                e.to_string(),
                e.kind_name(),
            )
        }
    };

    match executor.execute(chain, node, &ctx).await {
        Ok(mut result) => {
            if result.success {
                // Output aliases are an engine-boundary concern and apply
                // on the direct path too
                apply_output_mappings(node, &mut result);
            }
            result
        }
        Err(e) => NodeExecutionResult::failure(
            NodeMetadata::started(node),
            e.to_string(),
            e.kind_name(),
        ),
    }
}

/// Publish output aliases declared in `output_mappings`
///
/// Aliases resolve against the raw output and merge into it when the
/// output is an object; a path that fails to resolve is skipped with a
/// warning rather than failing the node.
fn apply_output_mappings(node: &NodeConfig, result: &mut NodeExecutionResult) {
    let mappings = &node.base().output_mappings;
    if mappings.is_empty() {
        return;
    }
    let Some(Value::Object(ref mut output)) = result.output else {
        return;
    };

    let raw = Value::Object(output.clone());
    let mut aliases = Vec::with_capacity(mappings.len());
    for (alias, path) in mappings {
        match resolve_path(&raw, path) {
            Ok(value) => aliases.push((alias.clone(), value.clone())),
            Err(e) => {
                tracing::warn!(
                    node = %node.id(),
                    alias = %alias,
                    error = %e,
                    "output mapping did not resolve"
                );
            }
        }
    }
    for (alias, value) in aliases {
        output.insert(alias, value);
    }
}

/// Sleep `backoff · 2^attempt` seconds; false when cancelled mid-sleep
async fn backoff_sleep(base_backoff: f64, attempt: u32, cancel: &CancelToken) -> bool {
    if base_backoff <= 0.0 {
        return true;
    }
    let wait = base_backoff * 2f64.powi(attempt as i32);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(wait)) => true,
        _ = cancel.cancelled() => false,
    }
}

fn cancelled_result(node: &NodeConfig) -> NodeExecutionResult {
    NodeExecutionResult::failure(
        NodeMetadata::started(node),
        "execution cancelled",
        "Cancelled",
    )
}

// Wrapper behavior is exercised end-to-end in tests/engine.rs: retry with
// eventual success, timeout conversion, cache hit short-circuiting, output
// validation demotion, and dependency failures skipping the executor.

#[cfg(test)]
mod tests {
    use crate::error::ChainError;

    #[test]
    fn test_error_kind_names_round_trip() {
        let timeout = ChainError::Timeout {
            node: "a".into(),
            seconds: 3,
        };
        assert_eq!(timeout.kind_name(), "TimeoutError");
        let dep = ChainError::dependency("a", "missing");
        assert_eq!(dep.kind_name(), "DependencyError");
    }
}
