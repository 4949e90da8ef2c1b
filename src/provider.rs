//! Language-model provider seam - chat trait, registry, retry policy

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::TokenUsage;

/// Role of one chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Instruction content
    System,
    /// User content
    User,
}

/// One message in a chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A single chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A provider's answer to a chat request
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Errors surfaced by chat providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No provider registered: {0}")]
    UnknownProvider(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Transient failures worth retrying; everything else surfaces
    /// immediately
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::RateLimited)
    }
}

/// A language-model provider able to answer chat requests
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Bounded exponential backoff with jitter, applied to transient provider
/// failures only
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all; the first error surfaces
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=exp / 4 + 1);
        Duration::from_millis(exp + jitter)
    }
}

/// Explicit registry of named chat providers.
///
/// Constructed once at startup and passed by reference to the orchestrator
/// and bee runner; there is no process-wide provider cache. The first
/// registered provider becomes the default unless one is named explicitly.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
    default_name: Option<String>,
    retry: RetryPolicy,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_name: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn register(mut self, name: impl Into<String>, provider: Arc<dyn ChatProvider>) -> Self {
        let name = name.into();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.providers.insert(name, provider);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers.get(name).cloned()
    }

    /// Chat through the default provider, retrying transient failures
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| ProviderError::UnknownProvider("no default provider".to_string()))?;
        self.chat_with(&name, request).await
    }

    /// Chat through a named provider, retrying transient failures
    pub async fn chat_with(
        &self,
        name: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?;

        let mut attempt = 0;
        loop {
            match provider.chat(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        provider = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(provider = name, attempt, error = %e, "Chat call failed");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Anthropic messages-API adapter
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();
        for message in &request.messages {
            match message.role {
                ChatRole::System => system_parts.push(message.content.clone()),
                ChatRole::User => messages.push(AnthropicMessage {
                    role: "user",
                    content: message.content.clone(),
                }),
            }
        }

        let body = AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(1024),
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status == 401 || status == 403 {
                ProviderError::Authentication(error_text)
            } else if status == 429 {
                ProviderError::RateLimited
            } else if status == 404 {
                ProviderError::ModelNotFound(request.model.clone())
            } else {
                ProviderError::Provider(format!("HTTP {status}: {error_text}"))
            });
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Provider(format!("Failed to parse response: {e}")))?;

        let content = parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();
        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
        };

        Ok(ChatResponse {
            content,
            usage: Some(usage),
        })
    }
}

/// Deterministic provider that replays queued responses in order.
///
/// Backs tests and offline dry runs; an exhausted script surfaces as a
/// non-retryable provider error.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, content: impl Into<String>, total_tokens: u64) {
        self.responses.lock().push_back(Ok(ChatResponse {
            content: content.into(),
            usage: Some(TokenUsage {
                input_tokens: 0,
                output_tokens: total_tokens,
                total_tokens,
            }),
        }));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Provider("scripted provider exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            temperature: None,
            max_tokens: Some(64),
        }
    }

    #[tokio::test]
    async fn test_first_registered_provider_is_default() {
        let scripted = Arc::new(ScriptedProvider::new());
        scripted.push_response("hello", 3);

        let registry = ProviderRegistry::new().register("scripted", scripted);
        let response = assert_ok!(registry.chat(&request()).await);
        assert_eq!(response.content, "hello");
        assert_eq!(response.usage.unwrap().total_tokens, 3);
    }

    #[tokio::test]
    async fn test_unknown_provider_name() {
        let registry = ProviderRegistry::new();
        let err = registry.chat(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(_)));

        let err = registry.chat_with("missing", &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let scripted = Arc::new(ScriptedProvider::new());
        scripted.push_error(ProviderError::RateLimited);
        scripted.push_error(ProviderError::Network("reset".to_string()));
        scripted.push_response("third time lucky", 1);

        let registry = ProviderRegistry::new().register("scripted", scripted.clone());
        let response = registry.chat(&request()).await.unwrap();
        assert_eq!(response.content, "third time lucky");
        assert_eq!(scripted.remaining(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let scripted = Arc::new(ScriptedProvider::new());
        scripted.push_error(ProviderError::Authentication("bad key".to_string()));
        scripted.push_response("never reached", 1);

        let registry = ProviderRegistry::new().register("scripted", scripted.clone());
        let err = registry.chat(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
        assert_eq!(scripted.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let scripted = Arc::new(ScriptedProvider::new());
        for _ in 0..5 {
            scripted.push_error(ProviderError::RateLimited);
        }

        let registry = ProviderRegistry::new()
            .with_retry(RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 10,
                max_delay_ms: 100,
            })
            .register("scripted", scripted.clone());

        let err = registry.chat(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
        // two attempts consumed, three scripted errors left
        assert_eq!(scripted.remaining(), 3);
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        for attempt in 0..10 {
            let delay = policy.delay(attempt).as_millis() as u64;
            assert!(delay <= 1_000 + 1_000 / 4 + 1);
        }
        assert!(policy.delay(0).as_millis() as u64 >= 100);
    }
}
