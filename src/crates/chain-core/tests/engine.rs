//! End-to-end engine scenarios: linear data flow, branch gating, retries,
//! bounded concurrency, guard aborts and recursion.

use async_trait::async_trait;
use chain_core::prelude::*;
use llm::{MockLlm, TokenUsage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tooling::tool::{Tool, ToolError, ToolResult};
use tooling::{register_builtin_tools, ToolRegistry};

/// Tool that fails its first `fail_times` invocations, then succeeds
struct FlakyTool {
    fail_times: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(&self, _args: Value) -> ToolResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            Err(ToolError::execution("flaky", format!("transient failure {call}")))
        } else {
            Ok(json!({"attempt": call}))
        }
    }
}

/// Tool that records the peak number of concurrent invocations
struct GaugeTool {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl GaugeTool {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for GaugeTool {
    fn name(&self) -> &str {
        "gauge"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(&self, _args: Value) -> ToolResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"ok": true}))
    }
}

/// Tool that never finishes within any sane timeout
struct StallTool;

#[async_trait]
impl Tool for StallTool {
    fn name(&self) -> &str {
        "stall"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(&self, _args: Value) -> ToolResult {
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        Ok(json!({}))
    }
}

fn builtin_tools() -> ToolRegistry {
    let tools = ToolRegistry::new();
    register_builtin_tools(&tools);
    tools
}

fn node(raw: Value) -> NodeConfig {
    serde_json::from_value(raw).expect("valid node config")
}

#[tokio::test]
async fn linear_tool_to_llm() {
    let tools = builtin_tools();
    let mock = MockLlm::replying("The total is 6.", TokenUsage::new(50, 10));

    let nodes = vec![
        node(json!({
            "type": "tool", "id": "a", "tool_name": "sum",
            "tool_args": {"numbers": [1, 2, 3]}
        })),
        node(json!({
            "type": "llm", "id": "b", "dependencies": ["a"],
            "input_mappings": {"total": {"source_node_id": "a",
                                         "source_output_path": "sum"}},
            "prompt_template": "Total is {{ total }}",
            "llm_config": {"model": "gpt-4o-mini"}
        })),
    ];

    let chain = Arc::new(
        Chain::builder(nodes)
            .tools(tools)
            .llm_service(Arc::new(mock))
            .build()
            .unwrap(),
    );
    let result = chain.execute(None).await.unwrap();

    assert!(result.success, "errors: {:?}", result.error);
    assert_eq!(result.node_output("a"), Some(&json!({"sum": 6.0})));
    let b_output = result.node_output("b").unwrap();
    assert!(b_output.as_str().unwrap().contains('6'));
    assert_eq!(result.token_stats.total_tokens, 60);
    assert!(result.token_stats.total_tokens > 0);
}

#[tokio::test]
async fn condition_gates_untaken_branch() {
    let nodes = vec![
        node(json!({
            "type": "tool", "id": "a", "tool_name": "sum",
            "tool_args": {"numbers": [1, 2, 3]}
        })),
        node(json!({
            "type": "condition", "id": "c", "dependencies": ["a"],
            "input_mappings": {"sum": {"source_node_id": "a",
                                       "source_output_path": "sum"}},
            "expression": "sum > 5",
            "true_branch": ["t"], "false_branch": ["f"]
        })),
        node(json!({"type": "tool", "id": "t", "dependencies": ["c"],
                    "tool_name": "echo", "tool_args": {"took": "true"}})),
        node(json!({"type": "tool", "id": "f", "dependencies": ["c"],
                    "tool_name": "echo", "tool_args": {"took": "false"}})),
        // Transitively downstream of the untaken branch: must also be absent
        node(json!({"type": "tool", "id": "after_f", "dependencies": ["f"],
                    "tool_name": "echo", "tool_args": {}})),
    ];

    let chain = Arc::new(Chain::builder(nodes).tools(builtin_tools()).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(result.success, "errors: {:?}", result.error);
    assert_eq!(result.node_output("c"), Some(&json!({"result": true})));
    assert!(result.node("t").is_some());
    assert!(result.node("f").is_none(), "untaken branch must be absent");
    assert!(result.node("after_f").is_none());
}

#[tokio::test]
async fn retry_with_eventual_success() {
    let tools = builtin_tools();
    tools
        .register(Arc::new(FlakyTool {
            fail_times: 1,
            calls: AtomicUsize::new(0),
        }))
        .unwrap();

    let nodes = vec![node(json!({
        "type": "tool", "id": "shaky", "tool_name": "flaky",
        "retries": 2, "backoff_seconds": 0.01
    }))];

    let chain = Arc::new(Chain::builder(nodes).tools(tools).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(result.success, "errors: {:?}", result.error);
    let shaky = result.node("shaky").unwrap();
    assert_eq!(shaky.metadata.retry_count, 1);
    assert_eq!(result.output.len(), 1, "retries must not duplicate entries");
}

#[tokio::test]
async fn retry_exhaustion_reports_last_error() {
    let tools = builtin_tools();
    tools
        .register(Arc::new(FlakyTool {
            fail_times: 10,
            calls: AtomicUsize::new(0),
        }))
        .unwrap();

    let nodes = vec![node(json!({
        "type": "tool", "id": "doomed", "tool_name": "flaky",
        "retries": 2, "backoff_seconds": 0.01
    }))];

    let chain = Arc::new(Chain::builder(nodes).tools(tools).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(!result.success);
    let doomed = result.node("doomed").unwrap();
    let error = doomed.error.as_deref().unwrap();
    assert!(error.contains("Retry limit exceeded (2)"), "got: {error}");
    assert!(error.contains("transient failure 2"), "got: {error}");
    assert_eq!(doomed.metadata.retry_count, 2);
}

#[tokio::test]
async fn bounded_concurrency_respects_max_parallel() {
    let gauge = Arc::new(GaugeTool::new());
    let tools = ToolRegistry::new();
    tools.register(gauge.clone()).unwrap();

    let nodes = vec![
        node(json!({"type": "tool", "id": "g1", "tool_name": "gauge", "use_cache": false})),
        node(json!({"type": "tool", "id": "g2", "tool_name": "gauge", "use_cache": false})),
        node(json!({"type": "tool", "id": "g3", "tool_name": "gauge", "use_cache": false})),
    ];

    let chain = Arc::new(
        Chain::builder(nodes)
            .tools(tools)
            .options(ChainOptions::default().with_max_parallel(2))
            .build()
            .unwrap(),
    );
    let result = chain.execute(None).await.unwrap();

    assert!(result.success);
    assert_eq!(gauge.calls.load(Ordering::SeqCst), 3, "all three must complete");
    assert!(
        gauge.peak.load(Ordering::SeqCst) <= 2,
        "peak concurrency {} exceeded max_parallel",
        gauge.peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn recursive_convergence() {
    let nodes = vec![
        node(json!({
            "type": "recursive", "id": "refine",
            "body_node_ids": ["bump"],
            "convergence_expression": "score >= 0.8",
            "initial_state": {"score": 0},
            "max_iterations": 5
        })),
        node(json!({
            "type": "tool", "id": "bump", "tool_name": "sum",
            "tool_args": {"numbers": ["{{ state.score }}", 0.3]},
            "output_mappings": {"score": "sum"}
        })),
    ];

    let chain = Arc::new(Chain::builder(nodes).tools(builtin_tools()).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(result.success, "errors: {:?}", result.error);
    let output = result.node_output("refine").unwrap();
    assert_eq!(output["converged"], json!(true));
    assert_eq!(output["current_iteration"], json!(3));
    let score = output["final_state"]["score"].as_f64().unwrap();
    assert!((score - 0.9).abs() < 1e-9, "score was {score}");
}

#[tokio::test]
async fn token_ceiling_aborts_following_levels() {
    let mock = MockLlm::replying("chunky answer", TokenUsage::new(100, 50));

    let nodes = vec![
        node(json!({
            "type": "llm", "id": "big", "prompt_template": "write a lot",
            "llm_config": {"model": "gpt-4o-mini"}
        })),
        node(json!({"type": "tool", "id": "after", "dependencies": ["big"],
                    "tool_name": "echo", "tool_args": {}})),
    ];

    let chain = Arc::new(
        Chain::builder(nodes)
            .tools(builtin_tools())
            .llm_service(Arc::new(mock))
            .options(ChainOptions::default().with_token_ceiling(100))
            .build()
            .unwrap(),
    );
    let result = chain.execute(None).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("Token ceiling exceeded"));
    // The offending node completed; nothing after it ran
    assert!(result.node("big").is_some());
    assert!(result.node("after").is_none());
    assert_eq!(result.token_stats.total_tokens, 150);
}

#[tokio::test]
async fn depth_ceiling_stops_descent() {
    let nodes = vec![
        node(json!({"type": "tool", "id": "l0", "tool_name": "echo", "tool_args": {}})),
        node(json!({"type": "tool", "id": "l1", "dependencies": ["l0"],
                    "tool_name": "echo", "tool_args": {}})),
        node(json!({"type": "tool", "id": "l2", "dependencies": ["l1"],
                    "tool_name": "echo", "tool_args": {}})),
    ];

    let chain = Arc::new(
        Chain::builder(nodes)
            .tools(builtin_tools())
            .options(ChainOptions::default().with_depth_ceiling(2))
            .build()
            .unwrap(),
    );
    let result = chain.execute(None).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("Depth ceiling reached"));
    assert!(result.node("l0").is_some());
    assert!(result.node("l1").is_some());
    assert!(result.node("l2").is_none());
}

#[tokio::test]
async fn guard_callbacks_abort() {
    let nodes = vec![
        node(json!({"type": "tool", "id": "a", "tool_name": "echo", "tool_args": {}})),
        node(json!({"type": "tool", "id": "b", "dependencies": ["a"],
                    "tool_name": "echo", "tool_args": {}})),
    ];

    let chain = Arc::new(
        Chain::builder(nodes)
            .tools(builtin_tools())
            .depth_guard(Arc::new(|level, _ceiling| level < 2))
            .build()
            .unwrap(),
    );
    let result = chain.execute(None).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("Depth guard aborted execution"));
    assert!(result.node("a").is_some());
    assert!(result.node("b").is_none());
}

#[tokio::test]
async fn per_node_timeout_converts_to_failure() {
    let tools = ToolRegistry::new();
    tools.register(Arc::new(StallTool)).unwrap();

    let nodes = vec![node(json!({
        "type": "tool", "id": "slow", "tool_name": "stall",
        "timeout_seconds": 1
    }))];

    let chain = Arc::new(Chain::builder(nodes).tools(tools).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(!result.success);
    let slow = result.node("slow").unwrap();
    assert_eq!(slow.metadata.error_type.as_deref(), Some("Timeout"));
    assert!(slow.error.as_deref().unwrap().contains("timeout"));
}

#[tokio::test]
async fn initial_context_reaches_nodes() {
    let nodes = vec![node(json!({
        "type": "tool", "id": "greet", "tool_name": "echo",
        "tool_args": {"message": "hello {{ user }}"}
    }))];

    let chain = Arc::new(
        Chain::builder(nodes)
            .tools(builtin_tools())
            .initial_context(json!({"user": "ada"}))
            .build()
            .unwrap(),
    );
    let result = chain.execute(None).await.unwrap();

    assert!(result.success);
    assert_eq!(
        result.node_output("greet"),
        Some(&json!({"message": "hello ada"}))
    );
}

#[tokio::test]
async fn output_validation_demotes_bad_output() {
    let nodes = vec![node(json!({
        "type": "tool", "id": "typed", "tool_name": "echo",
        "tool_args": {"value": "text"},
        "output_schema": {"value": "int"}
    }))];

    let chain = Arc::new(Chain::builder(nodes).tools(builtin_tools()).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(!result.success);
    let typed = result.node("typed").unwrap();
    assert_eq!(typed.metadata.error_type.as_deref(), Some("ValidationError"));
    assert!(typed.error.as_deref().unwrap().contains("Output validation failed"));
    // The wrapper did not retry a deterministic validation failure
    assert_eq!(typed.metadata.retry_count, 0);
}

#[tokio::test]
async fn parallel_fan_out_inside_workflow() {
    let nodes = vec![
        node(json!({
            "type": "parallel", "id": "fan",
            "branches": [
                {"id": "left", "node_ids": ["la"]},
                {"id": "right", "node_ids": ["ra"]}
            ],
            "max_concurrency": 2
        })),
        node(json!({"type": "tool", "id": "la", "tool_name": "sum",
                    "tool_args": {"numbers": [1, 1]}})),
        node(json!({"type": "tool", "id": "ra", "tool_name": "sum",
                    "tool_args": {"numbers": [2, 2]}})),
        node(json!({
            "type": "tool", "id": "join", "dependencies": ["fan"],
            "input_mappings": {"left": {"source_node_id": "fan",
                                        "source_output_path": "left.sum"},
                               "right": {"source_node_id": "fan",
                                         "source_output_path": "right.sum"}},
            "tool_name": "sum",
            "tool_args": {"numbers": ["{{ left }}", "{{ right }}"]}
        })),
    ];

    let chain = Arc::new(Chain::builder(nodes).tools(builtin_tools()).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(result.success, "errors: {:?}", result.error);
    assert_eq!(result.node_output("join"), Some(&json!({"sum": 6.0})));
    // Branch members ran only inside the container
    assert!(result.node("la").is_none());
    assert!(result.node("ra").is_none());
}

#[tokio::test]
async fn loop_over_dependency_items() {
    let nodes = vec![
        node(json!({"type": "tool", "id": "produce", "tool_name": "echo",
                    "tool_args": {"items": [1, 2, 3]}})),
        node(json!({
            "type": "loop", "id": "iterate", "dependencies": ["produce"],
            "items_source": "produce.items",
            "item_var": "n",
            "body_node_ids": ["double"],
            "max_iterations": 10
        })),
        node(json!({"type": "tool", "id": "double", "tool_name": "sum",
                    "tool_args": {"numbers": ["{{ n }}", "{{ n }}"]}})),
    ];

    let chain = Arc::new(Chain::builder(nodes).tools(builtin_tools()).build().unwrap());
    let result = chain.execute(None).await.unwrap();

    assert!(result.success, "errors: {:?}", result.error);
    let output = result.node_output("iterate").unwrap();
    assert_eq!(output["count"], json!(3));
    assert_eq!(
        output["iterations"],
        json!([
            {"double": {"sum": 2.0}},
            {"double": {"sum": 4.0}},
            {"double": {"sum": 6.0}}
        ])
    );
}
