//! Chat-completion client used by every agent role.
//!
//! One request, one response: no caching and no retry. Retrying is a
//! policy of the caller (see the Scout loop in the orchestrator).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
/// Per-request wait ceiling, same as the record store's. Slow models need a
/// larger `completion_timeout_secs`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepted sampling temperature range.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

/// Capability interface over the text-generation backend.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Generate text for a system/user prompt pair.
    ///
    /// # Errors
    ///
    /// `Error::Validation` for empty prompts or an out-of-range temperature,
    /// `Error::Completion` for any backend, transport or envelope failure.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
}

/// Checks shared by every `Completion` implementation.
pub fn validate_request(system: &str, user: &str, temperature: f32) -> Result<()> {
    if system.trim().is_empty() {
        return Err(Error::Validation("system prompt must be non-empty".into()));
    }
    if user.trim().is_empty() {
        return Err(Error::Validation("user prompt must be non-empty".into()));
    }
    if !temperature.is_finite() || !TEMPERATURE_RANGE.contains(&temperature) {
        return Err(Error::Validation(format!(
            "temperature {temperature} outside {}..={}",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end()
        )));
    }
    Ok(())
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Request body for the chat-completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull `choices[0].message.content` out of a raw response body.
pub fn extract_content(body: &str) -> Result<String> {
    let resp: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Completion(format!("malformed response envelope: {e}")))?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Completion("response has no choices[0].message.content".into()))
}

/// Turn a non-2xx status and body into a readable message.
fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => format!("API error {status}: {}", err.error.message),
        Err(_) if body.trim().is_empty() => format!("API error {status}"),
        Err(_) => format!("API error {status}: {}", body.trim()),
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    url: String,
    max_tokens: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::Validation("completion API key must be non-empty".into()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            url: DEFAULT_COMPLETION_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request_body(&self, system: &str, user: &str, temperature: f32) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![Message::system(system), Message::user(user)],
            temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Completion for OpenAiClient {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        validate_request(system, user, temperature)?;

        let body = self.request_body(system, user, temperature);
        tracing::debug!(model = %self.model, temperature, "Calling completion backend");

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Completion(format!("request timed out after {:?}", self.timeout))
                } else {
                    Error::Completion(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Completion(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Error::Completion(describe_failure(status, &text)));
        }

        extract_content(&text)
    }
}
