//! OpenAI-compatible chat completions client.
//!
//! Speaks the `/chat/completions` dialect shared by OpenAI, Deepseek,
//! OpenRouter, and local servers (Ollama, llama.cpp, LM Studio). The base
//! URL decides where requests go; the API key may be empty for local
//! endpoints.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::service::{LlmReply, LlmService, TokenUsage, ToolSchema};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP client for OpenAI-compatible endpoints.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    /// Create a client for the given endpoint.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create a client reading the API key from an environment variable.
    pub fn from_env(env_var: &str, base_url: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| LlmError::ApiKeyNotFound(format!("environment variable {env_var}")))?;
        Ok(Self::new(api_key, base_url))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(
        &self,
        config: &LlmConfig,
        prompt: &str,
        context: Option<&Value>,
        tools: Option<&[ToolSchema]>,
    ) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = context
            .and_then(|c| c.get("system"))
            .and_then(Value::as_str)
        {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
        });
        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                let descriptors: Vec<Value> = tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                body["tools"] = json!(descriptors);
            }
        }
        body
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiCompatClient {
    async fn request_once(&self, config: &LlmConfig, body: &Value) -> Result<LlmReply> {
        let mut request = self
            .http
            .post(self.completions_url())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        tracing::debug!(model = %config.model, url = %self.completions_url(), "dispatching chat completion");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(format!("{}s elapsed", config.timeout_seconds))
            } else {
                LlmError::Http(e)
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimitExceeded(status.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::Authentication(status.to_string()));
        }
        if status.is_server_error() {
            return Err(LlmError::ServiceUnavailable(status.to_string()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::InvalidRequest(format!("{status}: {detail}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".into()))?;

        // A native tool call is surfaced to the engine as the tool-call JSON
        // convention agents already parse: {"tool_name": ..., "arguments": ...}
        let text = if let Some(calls) = choice.message.tool_calls.filter(|c| !c.is_empty()) {
            let call = &calls[0];
            let arguments: Value =
                serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
            json!({"tool_name": call.function.name, "arguments": arguments}).to_string()
        } else {
            choice.message.content.unwrap_or_default()
        };

        let usage = parsed
            .usage
            .map(|u| {
                if u.total_tokens > 0 {
                    TokenUsage {
                        prompt_tokens: u.prompt_tokens,
                        completion_tokens: u.completion_tokens,
                        total_tokens: u.total_tokens,
                    }
                } else {
                    TokenUsage::new(u.prompt_tokens, u.completion_tokens)
                }
            })
            .unwrap_or_default();

        Ok(LlmReply { text, usage })
    }
}

#[async_trait]
impl LlmService for OpenAiCompatClient {
    async fn generate(
        &self,
        config: &LlmConfig,
        prompt: &str,
        context: Option<&Value>,
        tools: Option<&[ToolSchema]>,
    ) -> Result<LlmReply> {
        let body = self.build_body(config, prompt, context, tools);

        // Transient failures (rate limits, 5xx, timeouts) are retried with
        // exponential backoff up to the configured limit; permanent errors
        // surface immediately.
        let mut attempt: u32 = 0;
        loop {
            match self.request_once(config, &body).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < config.max_retries => {
                    let wait = 0.5 * 2f64.powi(attempt as i32);
                    tracing::warn!(
                        model = %config.model,
                        attempt,
                        error = %e,
                        "retrying chat completion in {wait:.1}s"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
