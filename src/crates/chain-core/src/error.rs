//! Error types for workflow construction and execution
//!
//! This module defines all errors the engine can produce. All errors
//! implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! ChainError
//! ├── Config        - Invalid workflow structure (cycles, dangling deps, ...)
//! ├── Dependency    - A runtime dependency is missing or unresolvable
//! ├── Expression    - A condition/convergence expression failed to evaluate
//! ├── Executor      - A node executor failed or raised
//! ├── Timeout       - A per-node timeout expired
//! ├── Validation    - A node output failed schema validation
//! ├── GuardAbort    - A token/depth guard stopped the run
//! ├── PolicyStop    - The failure policy denied continuation
//! ├── Serialization - JSON encode/decode errors
//! └── Io            - Filesystem errors from spec loading
//! ```
//!
//! Construction-time problems (`Config`) are fatal and surface as `Err` from
//! the chain builder. At runtime most failures are carried inside
//! [`NodeExecutionResult`](crate::result::NodeExecutionResult) instead of
//! propagating, so sibling nodes keep running; the exceptions are the HALT
//! failure policy, which re-raises the last node error out of the entry
//! point, and guard aborts.

use thiserror::Error;

/// Convenience result type using [`ChainError`]
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors produced by workflow validation and execution
#[derive(Error, Debug)]
pub enum ChainError {
    /// Invalid workflow configuration
    ///
    /// Cycles, self-dependencies, dangling dependency ids, unknown node
    /// kinds, unknown tools on tool nodes, or a tool allow-list on a node
    /// kind that cannot carry one. Raised during construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A runtime dependency was missing or a mapping path did not resolve
    ///
    /// Non-retryable: the consuming node fails without its executor being
    /// invoked.
    #[error("Node '{node}' dependency error: {error}")]
    Dependency {
        /// Node whose context could not be built
        node: String,
        /// Aggregated resolution failures
        error: String,
    },

    /// A condition or convergence expression failed to parse or evaluate
    #[error("Expression error: {0}")]
    Expression(String),

    /// A node executor returned a hard failure
    #[error("Node '{node}' execution failed: {error}")]
    Executor {
        /// Node that failed
        node: String,
        /// Error message from the executor
        error: String,
    },

    /// A per-node timeout expired
    #[error("Node '{node}' timed out after {seconds}s")]
    Timeout {
        /// Node that timed out
        node: String,
        /// Configured timeout in seconds
        seconds: u64,
    },

    /// A node output failed schema validation
    #[error("Output validation failed for node '{node}': {errors}")]
    Validation {
        /// Node whose output was rejected
        node: String,
        /// Joined validation error messages
        errors: String,
    },

    /// A token or depth guard aborted the run
    #[error("Guard aborted execution: {0}")]
    GuardAbort(String),

    /// The failure policy denied continuation
    #[error("Execution stopped by failure policy: {0}")]
    PolicyStop(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (spec loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a dependency error with node context
    pub fn dependency(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Dependency {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create an executor error with node context
    pub fn executor(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Executor {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Short machine-readable name of the error kind, recorded in node
    /// metadata as `error_type`
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChainError::Config(_) => "ConfigError",
            ChainError::Dependency { .. } => "DependencyError",
            ChainError::Expression(_) => "ExpressionError",
            ChainError::Executor { .. } => "ExecutorError",
            ChainError::Timeout { .. } => "TimeoutError",
            ChainError::Validation { .. } => "ValidationError",
            ChainError::GuardAbort(_) => "GuardAbort",
            ChainError::PolicyStop(_) => "PolicyStop",
            ChainError::Serialization(_) => "SerializationError",
            ChainError::Io(_) => "IoError",
        }
    }

    /// Whether the wrapper's attempt loop may retry after this error
    ///
    /// Dependency, expression and validation failures are deterministic:
    /// retrying cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::Executor { .. } | ChainError::Timeout { .. }
        )
    }
}
