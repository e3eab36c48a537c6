//! The service trait the workflow engine calls LLMs through.
//!
//! A single [`LlmService`] instance is injected into the engine and serves
//! every LLM and agent node; per-call routing happens through the
//! [`LlmConfig`](crate::LlmConfig) each node carries.

use crate::config::LlmConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u64,

    /// Tokens in the completion.
    pub completion_tokens: u64,

    /// Total tokens (prompt + completion).
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build a usage record, deriving the total when the provider omits it.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulate another usage record into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Tool definition in the structured shape providers expect for
/// function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name the model may call.
    pub name: String,

    /// Description surfaced to the model.
    #[serde(default)]
    pub description: String,

    /// JSON schema of the argument object.
    pub parameters: Value,
}

impl ToolSchema {
    /// Build a schema from a descriptor object `{name, description, parameters}`.
    pub fn from_descriptor(descriptor: &Value) -> Option<Self> {
        serde_json::from_value(descriptor.clone()).ok()
    }
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct LlmReply {
    /// The model's text output.
    pub text: String,

    /// Token usage for the call.
    pub usage: TokenUsage,
}

/// Text generation service backed by one or more LLM providers.
///
/// Implementations must be cancellation-aware: when the caller's future is
/// dropped (per-node timeout, guard abort), any in-flight request should be
/// abandoned rather than detached.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// `context` carries auxiliary key/values some providers accept
    /// (system instructions, metadata); `tools` advertises callable tools
    /// for function-calling capable models.
    async fn generate(
        &self,
        config: &LlmConfig,
        prompt: &str,
        context: Option<&Value>,
        tools: Option<&[ToolSchema]>,
    ) -> Result<LlmReply>;
}
