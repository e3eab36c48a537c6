//! Execution result types
//!
//! Every executed node produces exactly one [`NodeExecutionResult`]; the
//! chain entry point assembles them into a [`WorkflowResult`]. Results are
//! sealed once returned to the scheduler (nothing mutates them afterwards)
//! and both types serialize to the persisted result format (ISO-8601 UTC
//! timestamps, durations as float seconds).

use crate::node::{NodeConfig, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata attached to a node (or chain) execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Id of the node this result belongs to
    pub node_id: String,

    /// Kind of the node
    pub node_kind: NodeKind,

    /// Human-readable name, when configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When execution started
    pub start_time: DateTime<Utc>,

    /// When execution finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Wall-clock duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Error kind name when the node failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Number of retries performed before this result was produced
    #[serde(default)]
    pub retry_count: u32,
}

impl NodeMetadata {
    /// Start a metadata record for a node, stamped now
    pub fn started(node: &NodeConfig) -> Self {
        Self {
            node_id: node.id().to_string(),
            node_kind: node.kind(),
            name: node.base().name.clone(),
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            error_type: None,
            retry_count: 0,
        }
    }

    /// Stamp the end time and derive the duration
    pub fn finish(&mut self) {
        let end = Utc::now();
        self.duration = Some(
            (end - self.start_time)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );
        self.end_time = Some(end);
    }
}

/// Token usage and cost for a single node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Tokens in the prompt(s)
    #[serde(default)]
    pub prompt_tokens: u64,

    /// Tokens in the completion(s)
    #[serde(default)]
    pub completion_tokens: u64,

    /// Total tokens used
    #[serde(default)]
    pub total_tokens: u64,

    /// Cost of the call(s) in USD
    #[serde(default)]
    pub cost: f64,

    /// Number of API calls made
    #[serde(default = "default_api_calls")]
    pub api_calls: u32,

    /// Model used
    pub model: String,

    /// Provider used
    pub provider: String,

    /// Id of the node that generated this usage
    pub node_id: String,
}

fn default_api_calls() -> u32 {
    1
}

/// Result of a single node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    /// Whether the execution was successful
    pub success: bool,

    /// Output data from the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Error message if execution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Metadata about the execution
    pub metadata: NodeMetadata,

    /// Usage statistics, when external token-consuming services were called
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,

    /// Execution time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,

    /// Input context the node ran with (recorded when persistence is on)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_used: Option<Value>,
}

impl NodeExecutionResult {
    /// Build a successful result, stamping end time and duration
    pub fn success(mut metadata: NodeMetadata, output: Value) -> Self {
        metadata.finish();
        let execution_time = metadata.duration;
        Self {
            success: true,
            output: Some(output),
            error: None,
            metadata,
            usage: None,
            execution_time,
            context_used: None,
        }
    }

    /// Build a failed result, stamping end time and duration
    pub fn failure(
        mut metadata: NodeMetadata,
        error: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        metadata.finish();
        metadata.error_type = Some(error_type.into());
        let execution_time = metadata.duration;
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            metadata,
            usage: None,
            execution_time,
            context_used: None,
        }
    }

    /// Attach usage statistics
    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Attach partial output to a failed result
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// Aggregated token statistics for a workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStats {
    /// Sum of successful nodes' total tokens
    pub total_tokens: u64,

    /// Sum of successful nodes' cost in USD
    pub total_cost: f64,

    /// Sum of successful nodes' API calls
    pub total_api_calls: u32,

    /// Per-node usage snapshots
    #[serde(default)]
    pub per_node_usage: HashMap<String, UsageMetadata>,
}

/// Result of a workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Whether the run completed without any node failures or guard aborts
    pub success: bool,

    /// Per-node results for every executed node; inactive nodes are absent
    pub output: HashMap<String, NodeExecutionResult>,

    /// Joined error strings when the run accumulated errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Chain-level metadata; `node_id` carries the final (leaf) node id
    pub metadata: NodeMetadata,

    /// Wall-clock duration of the run in seconds
    pub execution_time: f64,

    /// Aggregated token statistics
    pub token_stats: TokenStats,
}

impl WorkflowResult {
    /// Result of the named node, if it executed
    pub fn node(&self, id: &str) -> Option<&NodeExecutionResult> {
        self.output.get(id)
    }

    /// Output value of the named node, if it executed successfully
    pub fn node_output(&self, id: &str) -> Option<&Value> {
        self.output
            .get(id)
            .filter(|r| r.success)
            .and_then(|r| r.output.as_ref())
    }
}
