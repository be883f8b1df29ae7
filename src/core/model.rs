//! Generation-service seam.
//!
//! Workflows talk to the model through [`GenerationService`]: ordered chat
//! messages in, non-empty text out. [`OpenAiClient`] is the production
//! implementation against any OpenAI-compatible `/chat/completions` endpoint.

use crate::core::config::ModelConfig;
use crate::core::error::ArchitectError;
use crate::core::output;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Longest slice of an error body echoed back to the operator.
const ERROR_BODY_CHARS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

pub trait GenerationService {
    /// Return the trimmed, non-empty response text or a transport error.
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ArchitectError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

pub struct OpenAiClient {
    config: ModelConfig,
    http: reqwest::blocking::Client,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Result<Self, ArchitectError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

impl GenerationService for OpenAiClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ArchitectError> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages,
        };
        info!(model = %self.config.model, messages = messages.len(), "calling model");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(|e| ArchitectError::TransportError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ArchitectError::TransportError(e.to_string()))?;
        if !status.is_success() {
            return Err(ArchitectError::TransportError(format!(
                "HTTP {}: {}",
                status.as_u16(),
                output::excerpt(&body, ERROR_BODY_CHARS)
            )));
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| ArchitectError::TransportError(format!("response is not JSON: {}", e)))?;
        let content = extract_content(&payload)?;
        debug!(chars = content.len(), "model responded");
        Ok(content)
    }
}

/// `choices[0].message.content`, trimmed, must be non-empty.
pub fn extract_content(payload: &Value) -> Result<String, ArchitectError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ArchitectError::TransportError("model returned no usable content".to_string()))
}
