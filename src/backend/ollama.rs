use std::{error::Error as _, time::Duration};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    backend::{BackendError, OllamaApi, OllamaChatRequest, OllamaChatResponse, OllamaTagsResponse},
    config::GatewayConfig,
};

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    chat_timeout: Duration,
    probe_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.probe_timeout)
            .build()
            .map_err(|error| {
                BackendError::Connection(format!("failed to build Ollama HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: config.ollama_base_url.trim_end_matches('/').to_owned(),
            chat_timeout: config.chat_timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl OllamaApi for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Result<OllamaTagsResponse, BackendError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(classify_send_error)?;

        let tags: OllamaTagsResponse = decode(response).await?;
        debug!(backend = self.name(), models = tags.models.len(), "tags fetched");
        Ok(tags)
    }

    async fn chat(&self, request: OllamaChatRequest) -> Result<OllamaChatResponse, BackendError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .timeout(self.chat_timeout)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let parsed: OllamaChatResponse = decode(response).await?;
        debug!(
            backend = self.name(),
            model = %request.model,
            prompt_eval_count = ?parsed.prompt_eval_count,
            eval_count = ?parsed.eval_count,
            "chat round trip completed"
        );
        Ok(parsed)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                let cause = describe(&error);
                warn!(
                    status = status.as_u16(),
                    error = %cause,
                    "failed to read Ollama error body"
                );
                format!("failed to read Ollama error body: {cause}")
            }
        };
        return Err(BackendError::Status { status, body });
    }

    response.json::<T>().await.map_err(|error| {
        if error.is_timeout() {
            BackendError::Timeout(describe(&error))
        } else {
            BackendError::InvalidResponse(describe(&error))
        }
    })
}

fn classify_send_error(error: reqwest::Error) -> BackendError {
    let cause = describe(&error);
    if error.is_timeout() {
        BackendError::Timeout(cause)
    } else {
        BackendError::Connection(cause)
    }
}

// reqwest's Display stops at "error sending request"; the cause is further
// down the source chain.
fn describe(error: &reqwest::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}
