use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use vitrine_core::config::LlmConfig;

use crate::tools::RawToolCall;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm request timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm returned HTTP {status}: {body}")]
    Response { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Response { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::Decode(_) | Self::Prompt(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    /// Ask the provider for a single JSON object instead of free text.
    pub json_mode: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<RawToolCall>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError>;
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Chat-completions client for OpenAI-compatible endpoints (OpenAI, Ollama).
pub struct OpenAiChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&SecretString>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|error| LlmError::Transport(format!("invalid api key header: {error}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            timeout,
            max_retries,
        })
    }

    /// `None` when the configured provider runs without a remote model.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, LlmError> {
        let Some(base_url) = config.effective_base_url() else {
            return Ok(None);
        };
        Self::new(
            &base_url,
            config.model.clone(),
            config.api_key.as_ref(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
        .map(Some)
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": 0,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
            body["tool_choice"] = json!("auto");
        }
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    async fn send_once(&self, body: &Value) -> Result<ChatCompletion, LlmError> {
        let response = self.http.post(&self.endpoint).json(body).send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout(self.timeout)
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Response { status: status.as_u16(), body });
        }

        let wire: WireResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        let Some(choice) = wire.choices.into_iter().next() else {
            return Err(LlmError::Decode("response contained no choices".to_string()));
        };

        Ok(ChatCompletion {
            content: choice.message.content.filter(|content| !content.trim().is_empty()),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| RawToolCall::from_encoded(call.function.name, &call.function.arguments))
                .collect(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        let body = self.body(&request);
        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(completion) => {
                    debug!(
                        event_name = "llm.completion.received",
                        model = %self.model,
                        tool_calls = completion.tool_calls.len(),
                        attempt,
                        "chat completion received"
                    );
                    return Ok(completion);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.completion.retry",
                        model = %self.model,
                        attempt,
                        error = %error,
                        "retrying chat completion"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Slice from the first `{` to the last `}`; models often wrap JSON in prose
/// or code fences.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
