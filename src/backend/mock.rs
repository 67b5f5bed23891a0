use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use tokio::{sync::Mutex, time::sleep};
use tracing::debug;

use crate::backend::{
    BackendError, OllamaApi, OllamaChatRequest, OllamaChatResponse, OllamaModelEntry,
    OllamaResponseMessage, OllamaTagsResponse,
};

#[derive(Debug)]
pub struct MockOllama {
    name: String,
    models: Result<OllamaTagsResponse, BackendError>,
    chat: Option<Result<OllamaChatResponse, BackendError>>,
    chat_delays: HashMap<String, Duration>,
    received: Mutex<Vec<OllamaChatRequest>>,
}

impl Default for MockOllama {
    fn default() -> Self {
        Self {
            name: "mock-ollama".to_owned(),
            models: Ok(OllamaTagsResponse {
                models: vec![OllamaModelEntry {
                    name: "mistral".to_owned(),
                }],
            }),
            chat: None,
            chat_delays: HashMap::new(),
            received: Mutex::new(Vec::new()),
        }
    }
}

impl MockOllama {
    pub fn with_models<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Ok(OllamaTagsResponse {
            models: names
                .into_iter()
                .map(|name| OllamaModelEntry { name: name.into() })
                .collect(),
        });
        self
    }

    pub fn with_models_error(mut self, error: BackendError) -> Self {
        self.models = Err(error);
        self
    }

    pub fn with_chat_response(mut self, response: OllamaChatResponse) -> Self {
        self.chat = Some(Ok(response));
        self
    }

    pub fn with_chat_error(mut self, error: BackendError) -> Self {
        self.chat = Some(Err(error));
        self
    }

    pub fn with_chat_delay(mut self, model: impl Into<String>, delay: Duration) -> Self {
        self.chat_delays.insert(model.into(), delay);
        self
    }

    pub async fn received(&self) -> Vec<OllamaChatRequest> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl OllamaApi for MockOllama {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self) -> Result<OllamaTagsResponse, BackendError> {
        self.models.clone()
    }

    async fn chat(&self, request: OllamaChatRequest) -> Result<OllamaChatResponse, BackendError> {
        debug!(backend = %self.name, model = %request.model, "mock chat");
        if let Some(delay) = self.chat_delays.get(&request.model) {
            sleep(*delay).await;
        }
        let reply = match &self.chat {
            Some(scripted) => scripted.clone(),
            None => Ok(echo_response(&request)),
        };
        self.received.lock().await.push(request);
        reply
    }
}

fn echo_response(request: &OllamaChatRequest) -> OllamaChatResponse {
    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.content.as_str())
        .unwrap_or("hello");
    let content = format!("Mock response for model {}: {}", request.model, prompt);

    let prompt_eval_count = request
        .messages
        .iter()
        .map(|message| word_count(&message.content))
        .sum::<u32>();
    let eval_count = word_count(&content);

    OllamaChatResponse {
        model: Some(request.model.clone()),
        created_at: Some(json!("2024-01-01T00:00:00Z")),
        message: Some(OllamaResponseMessage {
            role: Some("assistant".to_owned()),
            content: Some(content),
        }),
        done: Some(true),
        prompt_eval_count: Some(prompt_eval_count),
        eval_count: Some(eval_count),
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
