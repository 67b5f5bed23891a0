pub mod mock;
pub mod ollama;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ChatMessage;

#[async_trait]
pub trait OllamaApi: Send + Sync {
    fn name(&self) -> &str;
    async fn list_models(&self) -> Result<OllamaTagsResponse, BackendError>;
    async fn chat(&self, request: OllamaChatRequest) -> Result<OllamaChatResponse, BackendError>;

    async fn probe(&self) -> Result<(), BackendError> {
        self.list_models().await.map(|_| ())
    }

    async fn is_reachable(&self) -> bool {
        self.probe().await.is_ok()
    }
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Connection(_) | BackendError::Timeout(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Connection(_) => "connection",
            BackendError::Timeout(_) => "timeout",
            BackendError::Status { .. } => "status",
            BackendError::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: OllamaOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

// All optional: a missing field is reported by the translator, not by serde.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<OllamaResponseMessage>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OllamaResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OllamaTagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaModelEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaModelEntry {
    pub name: String,
}
