use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::config::env_string;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

impl LLMConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("LLM_API_KEY"),
            model: env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_endpoint: normalize_endpoint(
                &env_string("LLM_API_ENDPOINT")
                    .or_else(|| env_string("LLM_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            ),
            timeout: Duration::from_millis(
                env_string("LLM_TIMEOUT")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

/// Anything that can turn a chat transcript into a completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn is_available(&self) -> bool;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LLMError>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct LLMProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LLMProvider {
    pub fn new(config: LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn post_with_retry(&self, url: &str, api_key: &str, payload: &serde_json::Value) -> Result<ChatResponse, LLMError> {
        let mut retry = 0;
        loop {
            let err = match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            tracing::error!(error = %e, "failed to parse LLM response");
                            LLMError::Json(e)
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    if !is_retryable(status) {
                        return Err(LLMError::HttpStatus { status, body });
                    }
                    LLMError::HttpStatus { status, body }
                }
                Err(e) => LLMError::Request(e),
            };

            if retry >= MAX_RETRIES {
                return Err(err);
            }
            warn!(retry, error = %err, "LLM request failed, retrying");
            sleep(Duration::from_millis(BASE_BACKOFF_MS << retry)).await;
            retry += 1;
        }
    }
}

#[async_trait]
impl TextGenerator for LLMProvider {
    fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LLMError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LLMError::NotConfigured("LLM_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false
        });

        let response = self.post_with_retry(&url, api_key, &payload).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LLMError::EmptyChoices)
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
