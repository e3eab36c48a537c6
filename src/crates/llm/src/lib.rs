//! LLM provider layer for chainflow
//!
//! This crate defines the [`LlmService`] trait the workflow engine calls
//! into, plus the pieces around it: provider/model configuration, token
//! usage accounting, a per-token pricing table, an OpenAI-compatible HTTP
//! client, and a scripted mock service for tests.
//!
//! # Error-capture semantics
//!
//! `generate` returns `Result<LlmReply, LlmError>`. Transport-level and
//! provider-level failures come back as `Err`; the engine converts them
//! into failed node results rather than propagating panics. `LlmError`
//! exposes `is_retryable()` so callers can distinguish rate limits and
//! timeouts from permanent failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::{LlmConfig, LlmService, OpenAiCompatClient, Provider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenAiCompatClient::from_env(
//!         "OPENAI_API_KEY",
//!         "https://api.openai.com/v1",
//!     )?;
//!     let config = LlmConfig::new(Provider::OpenAi, "gpt-4o-mini").with_temperature(0.2);
//!
//!     let reply = client
//!         .generate(&config, "Summarize: the quick brown fox", None, None)
//!         .await?;
//!     println!("{} ({} tokens)", reply.text, reply.usage.total_tokens);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod openai_compat;
pub mod pricing;
pub mod service;

pub use config::{LlmConfig, Provider};
pub use error::{LlmError, Result};
pub use mock::MockLlm;
pub use openai_compat::OpenAiCompatClient;
pub use pricing::calculate_cost;
pub use service::{LlmReply, LlmService, TokenUsage, ToolSchema};
