//! Completion service seam.
//!
//! The pipeline treats the large-language-model service as an unreliable,
//! retryable dependency. [`CompletionService`] is the only thing the core
//! knows about it; [`HttpCompletionClient`] speaks the OpenAI-compatible chat
//! completions protocol over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CompletionConfig;
use crate::retry::RetryPolicy;

/// Chat role of one message in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One request to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Typed failure from the completion service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response had no content")]
    EmptyResponse,

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion service not configured: {0}")]
    NotConfigured(String),
}

impl CompletionError {
    /// Timeouts, transport failures, throttling and server errors are worth
    /// another try; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Timeout(_) | CompletionError::Transport(_) => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            CompletionError::EmptyResponse
            | CompletionError::Malformed(_)
            | CompletionError::NotConfigured(_) => false,
        }
    }
}

/// An external text-completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the text content of the first completion choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Call `service` under `policy`, retrying only retryable errors.
pub async fn complete_with_retry(
    service: &dyn CompletionService,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> Result<String, CompletionError> {
    policy
        .retry_if(|| service.complete(request), CompletionError::is_retryable)
        .await
}

/// Pull the JSON payload out of a model response, tolerating Markdown fences
/// and leading prose.
pub fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let unfenced = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        match rest.rfind("```") {
            Some(end) => &rest[..end],
            None => rest,
        }
    } else {
        trimmed
    };
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (end > start).then(|| &unfenced[start..=end])
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct HttpCompletionClient {
    endpoint: String,
    api_key: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            CompletionError::NotConfigured(
                "no API key (set CURATOR_API_KEY or OPENROUTER_API_KEY)".to_string(),
            )
        })?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("curator/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::NotConfigured(e.to_string()))?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            timeout,
            http_client,
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(model = %request.model, messages = request.messages.len(), "completion: sending request");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_extract_json_fenced() {
        let content = "```json\n{\"segment\": \"builders\"}\n```";
        assert_eq!(extract_json(content), Some("{\"segment\": \"builders\"}"));
    }

    #[test]
    fn test_extract_json_with_prose() {
        let content = "Here is the selection:\n{\"x\": [1, 2]}\nThanks!";
        assert_eq!(extract_json(content), Some("{\"x\": [1, 2]}"));
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CompletionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CompletionError::Transport("reset".into()).is_retryable());
        assert!(CompletionError::Status {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(CompletionError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!CompletionError::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!CompletionError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = CompletionConfig::default();
        let err = HttpCompletionClient::new(&config).err().expect("error");
        assert!(matches!(err, CompletionError::NotConfigured(_)));
    }
}
