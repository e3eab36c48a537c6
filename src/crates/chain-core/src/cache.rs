//! Result caching with single-flight key builds
//!
//! Node results are cached under a key that is a pure function of the node
//! kind, node id, resolved input context, and a canonical snapshot of the
//! node configuration, so changing a prompt or tool argument busts the cache
//! automatically. Only successful results are stored, so a hit always
//! replays a previously successful execution unchanged.
//!
//! The cache itself is an injected interface ([`ResultCache`]); the engine
//! layers single-flight semantics on top with a [`KeyedMutex`]: at most one
//! task builds a given key at a time, concurrent callers wait and then see
//! the stored result.

use crate::node::NodeConfig;
use crate::result::NodeExecutionResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tooling::serialization::{generate_hash, stable_json_string};

/// Content-addressed store for successful node results
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Fetch a cached result
    async fn get(&self, key: &str) -> Option<NodeExecutionResult>;

    /// Store a result
    async fn set(&self, key: &str, value: NodeExecutionResult);
}

/// In-memory result cache, the default for embedded use
#[derive(Default)]
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<String, NodeExecutionResult>>,
}

impl InMemoryResultCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &str) -> Option<NodeExecutionResult> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: NodeExecutionResult) {
        self.entries.write().await.insert(key.to_string(), value);
    }
}

/// Compute the cache key for a node execution
///
/// The key hashes `{kind, node_id, input, cfg}` through a stable key-sorted
/// JSON serialization. Returns `None` when the config snapshot cannot be
/// serialized; the caller skips caching rather than failing the node.
pub fn cache_key(node: &NodeConfig, input: &Value) -> Option<String> {
    let snapshot = serde_json::to_value(node).ok()?;
    let payload = serde_json::json!({
        "kind": node.kind().as_str(),
        "node_id": node.id(),
        "input": input,
        "cfg": snapshot,
    });
    let stable = stable_json_string(&payload).ok()?;
    Some(format!("{}:{:016x}", node.kind(), generate_hash(&stable)))
}

/// Per-key mutual exclusion for single-flight cache builds
///
/// `lock(key)` returns a guard; while it is held, other callers of the same
/// key wait. Entries are created on demand and retained for the lifetime of
/// the run (the set of cache keys per run is bounded by the node count).
#[derive(Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a key, waiting if another task holds it
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BaseNodeConfig, NodeConfig, ToolNodeConfig};
    use crate::result::NodeMetadata;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tool_node(id: &str, args: Value) -> NodeConfig {
        NodeConfig::Tool(ToolNodeConfig {
            base: BaseNodeConfig::new(id),
            tool_name: "echo".into(),
            tool_args: args,
        })
    }

    #[test]
    fn test_cache_key_is_stable() {
        let node = tool_node("a", json!({"x": 1}));
        let k1 = cache_key(&node, &json!({"b": 2, "a": 1})).unwrap();
        let k2 = cache_key(&node, &json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(k1, k2);
        assert!(k1.starts_with("tool:"));
    }

    #[test]
    fn test_cache_key_changes_with_config_and_input() {
        let node = tool_node("a", json!({"x": 1}));
        let base = cache_key(&node, &json!({})).unwrap();

        let changed_args = tool_node("a", json!({"x": 2}));
        assert_ne!(base, cache_key(&changed_args, &json!({})).unwrap());

        let changed_id = tool_node("b", json!({"x": 1}));
        assert_ne!(base, cache_key(&changed_id, &json!({})).unwrap());

        assert_ne!(base, cache_key(&node, &json!({"y": 1})).unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_cache_roundtrip() {
        let cache = InMemoryResultCache::new();
        let node = tool_node("a", json!({}));
        let result = NodeExecutionResult::success(NodeMetadata::started(&node), json!({"v": 1}));

        assert!(cache.get("k").await.is_none());
        cache.set("k", result).await;
        let hit = cache.get("k").await.unwrap();
        assert!(hit.success);
        assert_eq!(hit.output, Some(json!({"v": 1})));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_single_flight_serializes_same_key() {
        let flights = Arc::new(KeyedMutex::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let concurrent = concurrent.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = flights.lock("same-key").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_concurrently() {
        let flights = Arc::new(KeyedMutex::new());
        let guard_a = flights.lock("a").await;
        // Must not deadlock even while "a" is held
        let _guard_b = flights.lock("b").await;
        drop(guard_a);
    }
}
