//! Dependency graph validation and level computation
//!
//! The engine executes a workflow level by level: level k holds the nodes
//! whose longest dependency path from any root has length k. Nodes inside
//! one level have no edges between them, so they can run concurrently;
//! across levels execution strictly follows topological order.
//!
//! ```text
//! nodes:  A          B (dep A)      C (dep A)      D (dep B, C)
//!
//! level 0 ──► [A]
//! level 1 ──► [B, C]     (run concurrently)
//! level 2 ──► [D]
//! ```
//!
//! [`DependencyGraph::new`] validates the node list up front: dangling
//! dependency ids, self-dependencies and cycles are construction errors
//! naming the offending nodes, so execution never discovers a structural
//! problem at runtime. Within a level, node order follows declaration order
//! for determinism.

use crate::error::{ChainError, Result};
use crate::node::{InputMapping, NodeConfig};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Validated dependency structure of a workflow
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Node ids in declaration order
    order: Vec<String>,
    /// Direct predecessors per node
    dependencies: HashMap<String, Vec<String>>,
    /// Direct successors per node
    dependents: HashMap<String, Vec<String>>,
    /// Longest-path level per node
    node_levels: HashMap<String, usize>,
    /// level index → node ids (declaration order within a level)
    levels: BTreeMap<usize, Vec<String>>,
}

impl DependencyGraph {
    /// Build and validate the graph for a node list
    ///
    /// Fails with [`ChainError::Config`] on dangling dependency ids,
    /// self-dependencies, dangling body/branch references, or cycles.
    pub fn new(nodes: &[NodeConfig]) -> Result<Self> {
        let order: Vec<String> = nodes.iter().map(|n| n.id().to_string()).collect();
        let ids: HashSet<&str> = order.iter().map(String::as_str).collect();

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for id in &order {
            dependencies.insert(id.clone(), Vec::new());
            dependents.insert(id.clone(), Vec::new());
        }

        for node in nodes {
            let id = node.id();
            for dep in node.dependencies() {
                if dep == id {
                    return Err(ChainError::config(format!(
                        "node '{id}' cannot depend on itself"
                    )));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(ChainError::config(format!(
                        "node '{id}' depends on unknown node '{dep}'"
                    )));
                }
                dependencies.get_mut(id).expect("id inserted above").push(dep.clone());
                dependents
                    .get_mut(dep.as_str())
                    .expect("dep checked above")
                    .push(id.to_string());
            }
            for referenced in node.referenced_node_ids() {
                if !ids.contains(referenced) {
                    return Err(ChainError::config(format!(
                        "node '{id}' references unknown node '{referenced}'"
                    )));
                }
            }
        }

        let node_levels = compute_levels(&order, &dependencies, &dependents)?;

        let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in &order {
            let level = node_levels[id];
            levels.entry(level).or_default().push(id.clone());
        }

        Ok(Self {
            order,
            dependencies,
            dependents,
            node_levels,
            levels,
        })
    }

    /// level index → node ids, ascending
    pub fn levels(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.levels
    }

    /// Longest-path level of a node
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.node_levels.get(id).copied()
    }

    /// Direct predecessors of a node
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct successors of a node
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with no dependents, in declaration order
    pub fn leaves(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.dependents(id).is_empty())
            .cloned()
            .collect()
    }

    /// All node ids in declaration order
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    /// Transitive closure of dependents, excluding the seeds themselves
    ///
    /// Used by the failure policy to find nodes blocked by a failed
    /// ancestor.
    pub fn transitive_dependents(&self, seeds: &HashSet<String>) -> HashSet<String> {
        let mut closed = HashSet::new();
        let mut queue: VecDeque<&str> = seeds.iter().map(String::as_str).collect();
        while let Some(id) = queue.pop_front() {
            for dependent in self.dependents(id) {
                if closed.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        closed
    }

    /// Level decomposition of a subset of nodes, considering only edges
    /// inside the subset
    ///
    /// Loop bodies and parallel branches run through this: their nodes form
    /// an inner mini-DAG whose external dependencies are satisfied by the
    /// accumulated results.
    pub fn subgraph_levels(&self, subset: &[String]) -> BTreeMap<usize, Vec<String>> {
        let members: HashSet<&str> = subset.iter().map(String::as_str).collect();
        let mut level_by_id: HashMap<&str, usize> = HashMap::new();

        // Subset is small; iterate to a fixpoint in declaration order
        let ordered: Vec<&String> = self.order.iter().filter(|id| members.contains(id.as_str())).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for id in &ordered {
                let level = self
                    .dependencies(id)
                    .iter()
                    .filter(|dep| members.contains(dep.as_str()))
                    .filter_map(|dep| level_by_id.get(dep.as_str()).map(|l| l + 1))
                    .max()
                    .unwrap_or(0);
                if level_by_id.get(id.as_str()) != Some(&level) {
                    level_by_id.insert(id.as_str(), level);
                    changed = true;
                }
            }
        }

        let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in ordered {
            levels
                .entry(level_by_id[id.as_str()])
                .or_default()
                .push(id.clone());
        }
        levels
    }

    /// Check declared output schemas against the input mappings that
    /// consume them
    ///
    /// Only field-style schemas (`{field → type-name}`) carry enough
    /// information to check: a mapping whose path starts with a field the
    /// source schema does not declare yields a warning. Warnings are
    /// non-fatal; callers log them (strict modes may promote them).
    pub fn validate_schema_alignment(&self, nodes: &[NodeConfig]) -> Vec<String> {
        let by_id: HashMap<&str, &NodeConfig> = nodes.iter().map(|n| (n.id(), n)).collect();
        let mut warnings = Vec::new();

        for node in nodes {
            for (placeholder, mapping) in &node.base().input_mappings {
                let InputMapping::Reference {
                    source_node_id,
                    source_output_path,
                    ..
                } = mapping
                else {
                    continue;
                };
                let Some(source) = by_id.get(source_node_id.as_str()) else {
                    continue; // dangling ids are fatal elsewhere
                };
                let Some(schema) = source.base().output_schema.as_ref() else {
                    continue;
                };
                let Some(fields) = crate::validation::declared_fields(schema) else {
                    continue; // full JSON Schema documents are not checked here
                };
                let first_segment = source_output_path
                    .split('.')
                    .next()
                    .unwrap_or_default();
                if first_segment.is_empty() || first_segment == "." {
                    continue;
                }
                if !fields.contains(first_segment) {
                    warnings.push(format!(
                        "node '{}' mapping '{placeholder}' reads '{source_output_path}' but \
                         '{source_node_id}' does not declare output field '{first_segment}'",
                        node.id()
                    ));
                }
            }
        }
        warnings
    }
}

/// Kahn's algorithm, tracking the longest path from any root
fn compute_levels(
    order: &[String],
    dependencies: &HashMap<String, Vec<String>>,
    dependents: &HashMap<String, Vec<String>>,
) -> Result<HashMap<String, usize>> {
    let mut in_degree: HashMap<&str, usize> = order
        .iter()
        .map(|id| (id.as_str(), dependencies[id].len()))
        .collect();
    let mut levels: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = order
        .iter()
        .filter(|id| in_degree[id.as_str()] == 0)
        .map(String::as_str)
        .collect();

    for id in &queue {
        levels.insert((*id).to_string(), 0);
    }

    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        let level = levels[id];
        for dependent in &dependents[id] {
            let entry = levels.entry(dependent.clone()).or_insert(0);
            *entry = (*entry).max(level + 1);
            let degree = in_degree.get_mut(dependent.as_str()).expect("known node");
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if visited != order.len() {
        let cyclic: Vec<&str> = order
            .iter()
            .filter(|id| in_degree[id.as_str()] > 0)
            .map(String::as_str)
            .collect();
        return Err(ChainError::config(format!(
            "workflow contains a dependency cycle involving: {}",
            cyclic.join(", ")
        )));
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BaseNodeConfig, ToolNodeConfig};
    use serde_json::json;

    fn node(id: &str, deps: &[&str]) -> NodeConfig {
        let mut base = BaseNodeConfig::new(id);
        base.dependencies = deps.iter().map(|d| d.to_string()).collect();
        NodeConfig::Tool(ToolNodeConfig {
            base,
            tool_name: "echo".into(),
            tool_args: json!({}),
        })
    }

    #[test]
    fn test_diamond_levels() {
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ];
        let graph = DependencyGraph::new(&nodes).unwrap();

        assert_eq!(graph.levels()[&0], vec!["a"]);
        assert_eq!(graph.levels()[&1], vec!["b", "c"]);
        assert_eq!(graph.levels()[&2], vec!["d"]);
        assert_eq!(graph.level_of("d"), Some(2));
        assert_eq!(graph.leaves(), vec!["d"]);
    }

    #[test]
    fn test_longest_path_wins() {
        // e depends on both a (level 0) and d (level 2): e lands on level 3
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("d", &["b"]),
            node("e", &["a", "d"]),
        ];
        let graph = DependencyGraph::new(&nodes).unwrap();
        assert_eq!(graph.level_of("e"), Some(3));
    }

    #[test]
    fn test_cycle_reports_members() {
        let nodes = vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])];
        let err = DependencyGraph::new(&nodes).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle"));
        assert!(msg.contains('a') && msg.contains('b') && msg.contains('c'));
    }

    #[test]
    fn test_dangling_dependency() {
        let err = DependencyGraph::new(&[node("a", &["ghost"])]).unwrap_err();
        assert!(err.to_string().contains("unknown node 'ghost'"));
    }

    #[test]
    fn test_self_dependency() {
        let err = DependencyGraph::new(&[node("a", &["a"])]).unwrap_err();
        assert!(err.to_string().contains("depend on itself"));
    }

    #[test]
    fn test_dependents_query() {
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["a"])];
        let graph = DependencyGraph::new(&nodes).unwrap();
        assert_eq!(graph.dependents("a"), &["b", "c"]);
        assert_eq!(graph.dependencies("b"), &["a"]);
        assert!(graph.dependents("c").is_empty());
    }

    #[test]
    fn test_transitive_dependents() {
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("x", &[]),
        ];
        let graph = DependencyGraph::new(&nodes).unwrap();
        let seeds: HashSet<String> = ["a".to_string()].into();
        let closure = graph.transitive_dependents(&seeds);
        assert!(closure.contains("b") && closure.contains("c"));
        assert!(!closure.contains("a") && !closure.contains("x"));
    }

    #[test]
    fn test_subgraph_levels_ignore_external_edges() {
        let nodes = vec![
            node("root", &[]),
            node("p", &["root"]),
            node("q", &["root", "p"]),
        ];
        let graph = DependencyGraph::new(&nodes).unwrap();
        let levels = graph.subgraph_levels(&["p".to_string(), "q".to_string()]);
        assert_eq!(levels[&0], vec!["p"]);
        assert_eq!(levels[&1], vec!["q"]);

        // Without the internal edge both land on level 0
        let levels = graph.subgraph_levels(&["p".to_string(), "root".to_string()]);
        assert_eq!(levels[&0], vec!["root", "p"]);
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_schema_alignment_warnings() {
        let mut producer = node("a", &[]);
        if let NodeConfig::Tool(ref mut t) = producer {
            t.base.output_schema = Some(json!({"sum": "float"}));
        }
        let mut consumer = node("b", &["a"]);
        if let NodeConfig::Tool(ref mut t) = consumer {
            t.base = BaseNodeConfig::new("b")
                .with_dependency("a")
                .with_mapping("total", "a", "totall");
        }
        let nodes = vec![producer, consumer];
        let graph = DependencyGraph::new(&nodes).unwrap();
        let warnings = graph.validate_schema_alignment(&nodes);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("totall"));

        // Matching field: no warning
        let mut ok_consumer = node("c", &["a"]);
        if let NodeConfig::Tool(ref mut t) = ok_consumer {
            t.base = BaseNodeConfig::new("c")
                .with_dependency("a")
                .with_mapping("total", "a", "sum");
        }
        let nodes = vec![nodes[0].clone(), ok_consumer];
        let graph = DependencyGraph::new(&nodes).unwrap();
        assert!(graph.validate_schema_alignment(&nodes).is_empty());
    }
}
