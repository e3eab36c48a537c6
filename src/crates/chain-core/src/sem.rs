//! Weighted concurrency admission
//!
//! A level's nodes are admitted through a weighted semaphore: capacity
//! `max_parallel`, each node consuming permits proportional to its
//! estimated complexity. Heavy nodes (LLM calls with tools, recursion)
//! take more of the budget than cheap ones (conditions, plain tools), so
//! a level of mixed nodes backpressures on actual load rather than node
//! count.
//!
//! Weights are capped at the semaphore capacity: a node heavier than the
//! whole budget degrades to "runs alone" instead of deadlocking.

use crate::node::NodeConfig;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Deterministic complexity estimate by node kind
///
/// Ordering: LLM with tools > LLM > agent ≳ recursive/nested > loop ≳
/// parallel > tool ≳ condition.
pub fn estimate_complexity(node: &NodeConfig) -> usize {
    match node {
        NodeConfig::Llm(n) if !n.tools.is_empty() => 4,
        NodeConfig::Llm(_) => 3,
        NodeConfig::Agent(_) => 3,
        NodeConfig::Recursive(_) => 3,
        NodeConfig::NestedWorkflow(_) => 3,
        NodeConfig::Loop(_) => 2,
        NodeConfig::Parallel(_) => 2,
        NodeConfig::Tool(_) => 1,
        NodeConfig::Condition(_) => 1,
    }
}

/// Semaphore admitting tasks by weight
#[derive(Clone)]
pub struct WeightedSemaphore {
    inner: Arc<Semaphore>,
    capacity: usize,
}

impl WeightedSemaphore {
    /// Create a semaphore with the given capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Total permit capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently available
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    /// Acquire `weight` permits (at least 1, capped at capacity), waiting
    /// until enough are free
    pub async fn acquire(&self, weight: usize) -> OwnedSemaphorePermit {
        let weight = weight.clamp(1, self.capacity) as u32;
        self.inner
            .clone()
            .acquire_many_owned(weight)
            .await
            .expect("semaphore is never closed")
    }

    /// Acquire the weight estimated for a node
    pub async fn admit(&self, node: &NodeConfig) -> OwnedSemaphorePermit {
        self.acquire(estimate_complexity(node).max(1)).await
    }
}
