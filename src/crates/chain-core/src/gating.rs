//! Branch gating
//!
//! Condition nodes make runtime decisions; branch gating turns those
//! decisions into an active/inactive partition of the remaining graph.
//! A node is active iff:
//!
//! 1. no recorded decision explicitly disables it (decision `true` disables
//!    the condition's `false_branch` members and vice versa), and
//! 2. every direct dependency is active.
//!
//! Rule 2 propagates deactivation transitively, which keeps downstream
//! nodes from running with missing context. The propagation result is
//! memoized per node id, bounding the computation to O(V+E) per run; the
//! explicit check in rule 1 runs unmemoized so decisions recorded between
//! levels take effect immediately.

use crate::graph::DependencyGraph;
use crate::node::NodeConfig;
use std::collections::HashMap;

/// Runtime branch decisions and the memoized active-node computation
#[derive(Debug, Default)]
pub struct BranchGating {
    /// condition node id → decision
    decisions: HashMap<String, bool>,
    /// Memoized dependency-propagation outcomes
    active_cache: HashMap<String, bool>,
}

impl BranchGating {
    /// Create gating state with no decisions
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a condition node's decision
    ///
    /// Invalidates the memoized propagation results: a new decision can
    /// flip the status of anything downstream of the condition.
    pub fn record(&mut self, condition_id: &str, decision: bool) {
        tracing::debug!(condition = %condition_id, decision, "recorded branch decision");
        self.decisions.insert(condition_id.to_string(), decision);
        self.active_cache.clear();
    }

    /// Recorded decision for a condition node, if any
    pub fn decision(&self, condition_id: &str) -> Option<bool> {
        self.decisions.get(condition_id).copied()
    }

    /// Whether a node should run given the decisions so far
    pub fn is_active(
        &mut self,
        node_id: &str,
        nodes: &HashMap<String, NodeConfig>,
        graph: &DependencyGraph,
    ) -> bool {
        // Explicit branch gating, re-evaluated on every call
        for (cond_id, decision) in &self.decisions {
            let Some(NodeConfig::Condition(cond)) = nodes.get(cond_id) else {
                continue;
            };
            if *decision {
                if let Some(false_branch) = &cond.false_branch {
                    if false_branch.iter().any(|id| id == node_id) {
                        return false;
                    }
                }
            } else if cond.true_branch.iter().any(|id| id == node_id) {
                return false;
            }
        }

        // Implicit propagation through dependencies, memoized
        if let Some(active) = self.active_cache.get(node_id) {
            return *active;
        }
        for dep in graph.dependencies(node_id) {
            if !self.is_active(dep, nodes, graph) {
                self.active_cache.insert(node_id.to_string(), false);
                return false;
            }
        }
        self.active_cache.insert(node_id.to_string(), true);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BaseNodeConfig, ConditionNodeConfig, ToolNodeConfig};
    use serde_json::json;

    fn tool(id: &str, deps: &[&str]) -> NodeConfig {
        let mut base = BaseNodeConfig::new(id);
        base.dependencies = deps.iter().map(|d| d.to_string()).collect();
        NodeConfig::Tool(ToolNodeConfig {
            base,
            tool_name: "echo".into(),
            tool_args: json!({}),
        })
    }

    fn condition(id: &str, deps: &[&str], true_branch: &[&str], false_branch: &[&str]) -> NodeConfig {
        let mut base = BaseNodeConfig::new(id);
        base.dependencies = deps.iter().map(|d| d.to_string()).collect();
        NodeConfig::Condition(ConditionNodeConfig {
            base,
            expression: "x > 0".into(),
            true_branch: true_branch.iter().map(|s| s.to_string()).collect(),
            false_branch: if false_branch.is_empty() {
                None
            } else {
                Some(false_branch.iter().map(|s| s.to_string()).collect())
            },
        })
    }

    fn setup(
        nodes: Vec<NodeConfig>,
    ) -> (HashMap<String, NodeConfig>, DependencyGraph) {
        let graph = DependencyGraph::new(&nodes).unwrap();
        let map = nodes.into_iter().map(|n| (n.id().to_string(), n)).collect();
        (map, graph)
    }

    #[test]
    fn test_true_decision_disables_false_branch() {
        let (nodes, graph) = setup(vec![
            condition("c", &[], &["t"], &["f"]),
            tool("t", &["c"]),
            tool("f", &["c"]),
        ]);
        let mut gating = BranchGating::new();
        gating.record("c", true);

        assert!(gating.is_active("t", &nodes, &graph));
        assert!(!gating.is_active("f", &nodes, &graph));
    }

    #[test]
    fn test_false_decision_disables_true_branch() {
        let (nodes, graph) = setup(vec![
            condition("c", &[], &["t"], &["f"]),
            tool("t", &["c"]),
            tool("f", &["c"]),
        ]);
        let mut gating = BranchGating::new();
        gating.record("c", false);

        assert!(!gating.is_active("t", &nodes, &graph));
        assert!(gating.is_active("f", &nodes, &graph));
    }

    #[test]
    fn test_deactivation_propagates_transitively() {
        let (nodes, graph) = setup(vec![
            condition("c", &[], &["t"], &["f"]),
            tool("t", &["c"]),
            tool("f", &["c"]),
            tool("after_f", &["f"]),
            tool("deeper", &["after_f"]),
        ]);
        let mut gating = BranchGating::new();
        gating.record("c", true);

        assert!(!gating.is_active("after_f", &nodes, &graph));
        assert!(!gating.is_active("deeper", &nodes, &graph));
    }

    #[test]
    fn test_no_decisions_everything_active() {
        let (nodes, graph) = setup(vec![tool("a", &[]), tool("b", &["a"])]);
        let mut gating = BranchGating::new();
        assert!(gating.is_active("a", &nodes, &graph));
        assert!(gating.is_active("b", &nodes, &graph));
    }

    #[test]
    fn test_no_false_branch_means_nothing_disabled_on_true() {
        let (nodes, graph) = setup(vec![
            condition("c", &[], &["t"], &[]),
            tool("t", &["c"]),
            tool("other", &["c"]),
        ]);
        let mut gating = BranchGating::new();
        gating.record("c", true);
        assert!(gating.is_active("t", &nodes, &graph));
        assert!(gating.is_active("other", &nodes, &graph));
    }

    #[test]
    fn test_memoization_does_not_mask_late_decisions() {
        let (nodes, graph) = setup(vec![
            condition("c", &[], &[], &["victim"]),
            tool("victim", &["c"]),
            tool("bystander", &[]),
        ]);
        let mut gating = BranchGating::new();

        // Queried before any decision: active, and memoized
        assert!(gating.is_active("victim", &nodes, &graph));

        // Recording a decision invalidates the memo, so the node flips
        gating.record("c", true);
        assert!(!gating.is_active("victim", &nodes, &graph));
        assert!(gating.is_active("bystander", &nodes, &graph));
    }
}
