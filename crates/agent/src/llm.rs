//! Completion service client.
//!
//! Both supported providers speak the OpenAI chat-completions dialect, so one
//! HTTP client covers them; only the endpoint and the bearer credential vary.
//! Transient failures are retried with exponential backoff inside
//! [`ChatCompletionsClient::complete`], bounded by the configured retry
//! limit, so the turn controller sees a single result per turn.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use carecall_core::config::{LlmConfig, LlmProvider};
use carecall_core::TurnMessage;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";
const UPSTREAM_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion service returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("completion response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("completion response carried no message content")]
    Empty,
}

impl CompletionError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Empty => false,
        }
    }
}

/// Boundary to the completion service.
///
/// The runtime only needs "messages in, reply text out"; swapping providers,
/// or scripting the model in tests, happens behind this trait.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[TurnMessage]) -> Result<String, CompletionError>;
}

/// Exponential backoff between completion retries.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 2_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => OLLAMA_DEFAULT_BASE_URL.to_string(),
        };

        Ok(Self {
            client,
            endpoint: chat_completions_endpoint(&base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    async fn request_once(&self, messages: &[TurnMessage]) -> Result<String, CompletionError> {
        let payload = ChatRequest { model: &self.model, messages, temperature: 0.2 };
        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let decoded: ChatResponse = serde_json::from_str(&body)?;
        content_from_response(decoded)
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(&self, messages: &[TurnMessage]) -> Result<String, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.request_once(messages).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "completion attempt failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [TurnMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_completions_endpoint(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

fn content_from_response(response: ChatResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(CompletionError::Empty)
}

fn truncate_body(body: &str) -> String {
    if body.len() <= UPSTREAM_BODY_LIMIT {
        return body.to_string();
    }
    let cut = body
        .char_indices()
        .take_while(|(index, _)| *index <= UPSTREAM_BODY_LIMIT)
        .last()
        .map(|(index, _)| index)
        .unwrap_or(0);
    format!("{}…", &body[..cut])
}
