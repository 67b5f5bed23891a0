use chrono::DateTime;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    backend::{
        OllamaChatRequest, OllamaChatResponse, OllamaModelEntry, OllamaOptions,
        OllamaTagsResponse,
    },
    models::{
        ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelInfo,
        ModelList, Usage,
    },
};

pub const OWNED_BY: &str = "ollama";
const COMPLETION_ID_PREFIX: &str = "chatcmpl-";
const COMPLETION_ID_LEN: usize = 29;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("backend response is missing `{0}`")]
    MissingField(&'static str),
}

pub fn to_backend_chat_request(request: &ChatCompletionRequest) -> OllamaChatRequest {
    OllamaChatRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        stream: false,
        options: OllamaOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
    }
}

pub fn from_backend_chat_response(
    response: OllamaChatResponse,
    requested_model: &str,
) -> Result<ChatCompletionResponse, MappingError> {
    let content = response
        .message
        .ok_or(MappingError::MissingField("message"))?
        .content
        .ok_or(MappingError::MissingField("message.content"))?;

    Ok(ChatCompletionResponse {
        id: completion_id(),
        object: "chat.completion".to_owned(),
        created: parse_created(response.created_at.as_ref()),
        model: requested_model.to_owned(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_owned(),
                content,
            },
            finish_reason: "stop".to_owned(),
        }],
        usage: Usage::new(
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0),
        ),
    })
}

pub fn to_model_info(entry: &OllamaModelEntry) -> ModelInfo {
    ModelInfo {
        id: entry.name.clone(),
        object: "model".to_owned(),
        created: 0,
        owned_by: OWNED_BY.to_owned(),
    }
}

pub fn to_model_list(tags: &OllamaTagsResponse) -> ModelList {
    ModelList {
        object: "list".to_owned(),
        data: tags.models.iter().map(to_model_info).collect(),
    }
}

fn completion_id() -> String {
    let mut id = format!("{COMPLETION_ID_PREFIX}{}", Uuid::new_v4().simple());
    id.truncate(COMPLETION_ID_LEN);
    id
}

// Ollama sends RFC 3339; plain numbers are accepted too. Anything else is 0.
fn parse_created(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(float_seconds))
            .unwrap_or(0),
        Some(Value::String(text)) => parse_created_str(text.trim()).unwrap_or(0),
        _ => 0,
    }
}

fn parse_created_str(text: &str) -> Option<i64> {
    if let Ok(seconds) = text.parse::<i64>() {
        return Some(seconds);
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return float_seconds(seconds);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|timestamp| timestamp.timestamp())
}

// `as` saturates, so out-of-range values would otherwise become i64::MAX/MIN.
fn float_seconds(seconds: f64) -> Option<i64> {
    let in_range = seconds >= i64::MIN as f64 && seconds < i64::MAX as f64;
    (seconds.is_finite() && in_range).then_some(seconds as i64)
}
