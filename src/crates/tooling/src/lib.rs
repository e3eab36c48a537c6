//! Tooling utilities for chainflow
//!
//! This crate provides the tool contract shared by the chainflow workspace:
//! the [`Tool`] trait that deterministic compute units implement, the
//! [`ToolRegistry`] the engine resolves tool names through, a handful of
//! built-in tools, and serialization helpers used for cache keys.
//!
//! # Modules
//!
//! - `tool` - The `Tool` trait, `ToolError` and `ToolRegistry`
//! - `builtin` - Built-in deterministic tools (sum, sleep, json_merge, echo)
//! - `serialization` - Stable JSON serialization and hashing utilities

pub mod builtin;
pub mod serialization;
pub mod tool;

use thiserror::Error;

pub use builtin::{register_builtin_tools, EchoTool, JsonMergeTool, SleepTool, SumTool};
pub use tool::{Tool, ToolError, ToolRegistry, ToolResult};

/// Errors that can occur in the tooling crate outside of tool execution
#[derive(Debug, Error)]
pub enum ToolingError {
    /// General error with message
    #[error("Tooling error: {0}")]
    General(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
