//! Memory interface for agent nodes
//!
//! Agents may be granted a memory accessor with four scopes: working
//! (scratch state for the current task), episodic (what happened),
//! semantic (facts), and procedural (how-tos). The engine itself never
//! reads or writes memory; it threads the accessor through to agent
//! executors and stays stateless across runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The four memory scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Working,
    Episodic,
    Semantic,
    Procedural,
}

/// One stored memory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Entry key, unique within its scope
    pub key: String,

    /// Stored content
    pub content: Value,

    /// Optional caller-provided metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// When the entry was stored
    pub created_at: DateTime<Utc>,
}

/// Scoped memory store handed to agent executors
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store content under a key; overwrites an existing entry
    async fn store(&self, scope: MemoryScope, key: &str, content: Value, metadata: Option<Value>);

    /// Retrieve an entry by key
    async fn retrieve(&self, scope: MemoryScope, key: &str) -> Option<MemoryEntry>;

    /// Search a scope for entries whose content or key matches `query`,
    /// newest first, at most `limit`
    async fn search(&self, scope: MemoryScope, query: &str, limit: usize) -> Vec<MemoryEntry>;
}

/// In-memory implementation with substring search
#[derive(Default)]
pub struct InMemoryMemory {
    scopes: RwLock<HashMap<MemoryScope, HashMap<String, MemoryEntry>>>,
}

impl InMemoryMemory {
    /// Create an empty memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemory {
    async fn store(&self, scope: MemoryScope, key: &str, content: Value, metadata: Option<Value>) {
        let entry = MemoryEntry {
            key: key.to_string(),
            content,
            metadata,
            created_at: Utc::now(),
        };
        self.scopes
            .write()
            .await
            .entry(scope)
            .or_default()
            .insert(key.to_string(), entry);
    }

    async fn retrieve(&self, scope: MemoryScope, key: &str) -> Option<MemoryEntry> {
        self.scopes
            .read()
            .await
            .get(&scope)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    async fn search(&self, scope: MemoryScope, query: &str, limit: usize) -> Vec<MemoryEntry> {
        let scopes = self.scopes.read().await;
        let Some(entries) = scopes.get(&scope) else {
            return Vec::new();
        };
        let needle = query.to_lowercase();
        let mut matches: Vec<MemoryEntry> = entries
            .values()
            .filter(|entry| {
                entry.key.to_lowercase().contains(&needle)
                    || entry.content.to_string().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        matches
    }
}
