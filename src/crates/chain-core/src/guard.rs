//! Engine configuration, failure policy and guardrails
//!
//! Guardrails are external callbacks consulted between levels: the token
//! guard after usage is merged, the depth guard before a level starts.
//! Returning `false` aborts further levels; the built-in ceilings apply
//! even without a callback installed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// External token guard: `(total_tokens, ceiling) → continue?`
pub type TokenGuard = Arc<dyn Fn(u64, Option<u64>) -> bool + Send + Sync>;

/// External depth guard: `(level_index, ceiling) → continue?`
pub type DepthGuard = Arc<dyn Fn(usize, Option<usize>) -> bool + Send + Sync>;

/// How the engine reacts to node failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any node failure stops the run; the last error propagates out of
    /// the entry point
    Halt,

    /// Continue to the next level iff at least one remaining node is not
    /// blocked by a failed transitive dependency
    #[default]
    ContinuePossible,

    /// Always continue regardless of failures (guard ceilings still apply)
    Always,
}

/// Engine configuration
///
/// # Example
///
/// ```rust
/// use chain_core::guard::{ChainOptions, FailurePolicy};
///
/// let options = ChainOptions::default()
///     .with_max_parallel(8)
///     .with_failure_policy(FailurePolicy::Halt)
///     .with_token_ceiling(50_000);
/// assert_eq!(options.max_parallel, 8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOptions {
    /// Weighted concurrency capacity per level
    pub max_parallel: usize,

    /// Record node outputs to the context store
    pub persist_intermediate_outputs: bool,

    /// Failure handling policy
    pub failure_policy: FailurePolicy,

    /// Abort once total tokens exceed this ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_ceiling: Option<u64>,

    /// Abort once the 1-based level index exceeds this ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_ceiling: Option<usize>,

    /// Chain-level cache toggle (per-node `use_cache` still applies)
    pub use_cache: bool,

    /// Validate node outputs against declared schemas
    pub validate_outputs: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            persist_intermediate_outputs: true,
            failure_policy: FailurePolicy::ContinuePossible,
            token_ceiling: None,
            depth_ceiling: None,
            use_cache: true,
            validate_outputs: true,
        }
    }
}

impl ChainOptions {
    /// Set the weighted concurrency capacity (minimum 1)
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Set the failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the token ceiling
    pub fn with_token_ceiling(mut self, ceiling: u64) -> Self {
        self.token_ceiling = Some(ceiling);
        self
    }

    /// Set the depth ceiling
    pub fn with_depth_ceiling(mut self, ceiling: usize) -> Self {
        self.depth_ceiling = Some(ceiling);
        self
    }

    /// Enable or disable the result cache
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Enable or disable output validation
    pub fn with_validate_outputs(mut self, validate: bool) -> Self {
        self.validate_outputs = validate;
        self
    }

    /// Enable or disable output persistence
    pub fn with_persist_outputs(mut self, persist: bool) -> Self {
        self.persist_intermediate_outputs = persist;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ChainOptions::default();
        assert_eq!(options.max_parallel, 5);
        assert!(options.persist_intermediate_outputs);
        assert_eq!(options.failure_policy, FailurePolicy::ContinuePossible);
        assert!(options.token_ceiling.is_none());
        assert!(options.use_cache);
        assert!(options.validate_outputs);
    }

    #[test]
    fn test_max_parallel_floor() {
        assert_eq!(ChainOptions::default().with_max_parallel(0).max_parallel, 1);
    }

    #[test]
    fn test_policy_serde() {
        let policy: FailurePolicy = serde_json::from_str("\"continue_possible\"").unwrap();
        assert_eq!(policy, FailurePolicy::ContinuePossible);
        assert_eq!(
            serde_json::to_string(&FailurePolicy::Halt).unwrap(),
            "\"halt\""
        );
    }
}
