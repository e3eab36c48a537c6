//! Scripted mock LLM service.
//!
//! Replays a fixed sequence of replies and records every prompt it was
//! called with. The engine's test suites use this to drive LLM and agent
//! nodes without network access; it also lets tests assert call counts for
//! cache-hit and retry behavior.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::service::{LlmReply, LlmService, TokenUsage, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted outcome.
enum Scripted {
    Reply { text: String, usage: TokenUsage },
    Failure(String),
}

/// Mock [`LlmService`] that replays scripted replies in order.
///
/// When the script is exhausted the last reply repeats, so single-reply
/// mocks can serve any number of calls.
#[derive(Default)]
pub struct MockLlm {
    script: Mutex<Vec<Scripted>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    /// Create a mock with an empty script; calls fail until a reply is added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that always answers `text` with the given usage.
    pub fn replying(text: impl Into<String>, usage: TokenUsage) -> Self {
        let mock = Self::new();
        mock.push_reply(text, usage);
        mock
    }

    /// Append a successful reply to the script.
    pub fn push_reply(&self, text: impl Into<String>, usage: TokenUsage) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push(Scripted::Reply {
                text: text.into(),
                usage,
            });
    }

    /// Append a provider failure to the script.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push(Scripted::Failure(message.into()));
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .expect("mock prompt lock poisoned")
            .clone()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn generate(
        &self,
        _config: &LlmConfig,
        prompt: &str,
        _context: Option<&Value>,
        _tools: Option<&[ToolSchema]>,
    ) -> Result<LlmReply> {
        let call_idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("mock prompt lock poisoned")
            .push(prompt.to_string());

        let script = self.script.lock().expect("mock script lock poisoned");
        if script.is_empty() {
            return Err(LlmError::Provider("mock script is empty".into()));
        }
        let entry = &script[call_idx.min(script.len() - 1)];
        match entry {
            Scripted::Reply { text, usage } => Ok(LlmReply {
                text: text.clone(),
                usage: *usage,
            }),
            Scripted::Failure(message) => Err(LlmError::Provider(message.clone())),
        }
    }
}
