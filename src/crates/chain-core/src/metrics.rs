//! Chain execution metrics
//!
//! The scheduler updates metrics after each successful node result is
//! committed, never from inside executors, so there is no lock contention
//! on the hot path. Failed nodes contribute nothing unless their executor
//! attached partial usage.

use crate::result::{NodeExecutionResult, TokenStats};
use std::collections::HashMap;

/// Running token/cost totals plus per-node snapshots
#[derive(Debug, Clone, Default)]
pub struct ChainMetrics {
    /// Sum of total tokens across recorded usage
    pub total_tokens: u64,

    /// Sum of cost in USD
    pub total_cost: f64,

    /// Sum of API calls
    pub total_api_calls: u32,

    /// Per-node usage snapshots
    pub node_metrics: HashMap<String, crate::result::UsageMetadata>,
}

impl ChainMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the usage attached to a node result, if any
    pub fn update(&mut self, node_id: &str, result: &NodeExecutionResult) {
        if let Some(usage) = &result.usage {
            self.total_tokens += usage.total_tokens;
            self.total_cost += usage.cost;
            self.total_api_calls += usage.api_calls;
            self.node_metrics.insert(node_id.to_string(), usage.clone());
        }
    }

    /// Snapshot as the persisted stats shape
    pub fn as_stats(&self) -> TokenStats {
        TokenStats {
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            total_api_calls: self.total_api_calls,
            per_node_usage: self.node_metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BaseNodeConfig, NodeConfig, ToolNodeConfig};
    use crate::result::{NodeMetadata, UsageMetadata};
    use serde_json::json;

    fn result_with_usage(node_id: &str, total_tokens: u64, cost: f64) -> NodeExecutionResult {
        let node = NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new(node_id),
            tool_name: "echo".into(),
            tool_args: json!({}),
        });
        NodeExecutionResult::success(NodeMetadata::started(&node), json!({})).with_usage(
            UsageMetadata {
                prompt_tokens: total_tokens / 2,
                completion_tokens: total_tokens - total_tokens / 2,
                total_tokens,
                cost,
                api_calls: 1,
                model: "gpt-4o-mini".into(),
                provider: "openai".into(),
                node_id: node_id.into(),
            },
        )
    }

    #[test]
    fn test_update_accumulates() {
        let mut metrics = ChainMetrics::new();
        metrics.update("a", &result_with_usage("a", 100, 0.01));
        metrics.update("b", &result_with_usage("b", 50, 0.005));

        assert_eq!(metrics.total_tokens, 150);
        assert!((metrics.total_cost - 0.015).abs() < 1e-12);
        assert_eq!(metrics.total_api_calls, 2);
        assert_eq!(metrics.node_metrics.len(), 2);
    }

    #[test]
    fn test_result_without_usage_is_ignored() {
        let node = NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new("a"),
            tool_name: "echo".into(),
            tool_args: json!({}),
        });
        let result = NodeExecutionResult::success(NodeMetadata::started(&node), json!({}));

        let mut metrics = ChainMetrics::new();
        metrics.update("a", &result);
        assert_eq!(metrics.total_tokens, 0);
        assert!(metrics.node_metrics.is_empty());
    }

    #[test]
    fn test_as_stats_snapshot() {
        let mut metrics = ChainMetrics::new();
        metrics.update("a", &result_with_usage("a", 10, 0.001));
        let stats = metrics.as_stats();
        assert_eq!(stats.total_tokens, 10);
        assert!(stats.per_node_usage.contains_key("a"));
    }
}
