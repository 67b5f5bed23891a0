use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::StreamMode,
    errors::AppError,
    health::check_health,
    models::{Banner, ChatCompletionRequest},
    state::AppState,
    translate,
};

const CHAT_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";

pub async fn root() -> Json<Banner> {
    Json(Banner {
        message: "OpenAI-compatible API gateway for Ollama",
    })
}

pub async fn health(State(state): State<AppState>) -> Response {
    let report = check_health(state.backend.as_ref()).await;
    Json(report).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => AppError::Internal(format!("metrics render failed: {error}")).into_response(),
    }
}

pub async fn list_models(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();

    let response = match process_list_models(&state).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    };

    state.metrics.observe_request(
        MODELS_PATH,
        "GET",
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

async fn process_list_models(state: &AppState) -> Result<Response, AppError> {
    let tags = state.backend.list_models().await.map_err(|error| {
        state
            .metrics
            .observe_backend_error("list_models", error.kind());
        warn!(backend = state.backend.name(), error = %error, "model listing failed");
        AppError::from_list_failure(error)
    })?;

    Ok(Json(translate::to_model_list(&tags)).into_response())
}

pub async fn chat_completions(
    State(state): State<AppState>,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();

    let response = match process_chat_completions(&state, body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    };

    state.metrics.observe_request(
        CHAT_PATH,
        "POST",
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

async fn process_chat_completions(
    state: &AppState,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "chat request rejected by schema");
        AppError::from(rejection)
    })?;
    request.validate().map_err(AppError::BadRequest)?;

    let request_id = format!("req_{}", Uuid::new_v4());
    if request.stream {
        match state.config.stream_mode {
            StreamMode::Reject => {
                return Err(AppError::BadRequest(
                    "stream=true is not supported by this gateway".to_owned(),
                ));
            }
            StreamMode::Downgrade => {
                warn!(%request_id, "stream=true requested, answering non-streaming");
            }
        }
    }

    info!(
        %request_id,
        model = %request.model,
        messages = request.messages.len(),
        temperature = ?request.temperature,
        max_tokens = ?request.max_tokens,
        "chat request accepted"
    );

    let payload = translate::to_backend_chat_request(&request);
    let backend_response = state.backend.chat(payload).await.map_err(|error| {
        state.metrics.observe_backend_error("chat", error.kind());
        warn!(%request_id, model = %request.model, error = %error, "ollama chat failed");
        AppError::from_chat_failure(error)
    })?;

    let completion = translate::from_backend_chat_response(backend_response, &request.model)
        .map_err(|error| {
            state.metrics.observe_backend_error("chat", "mapping");
            warn!(%request_id, error = %error, "ollama chat response could not be mapped");
            AppError::from(error)
        })?;

    state.metrics.observe_usage(&completion.usage);
    info!(
        %request_id,
        completion_id = %completion.id,
        prompt_tokens = completion.usage.prompt_tokens,
        completion_tokens = completion.usage.completion_tokens,
        "chat request completed"
    );

    Ok(Json(completion).into_response())
}
