pub mod backend;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod models;
pub mod state;
pub mod translate;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use backend::{ollama::OllamaClient, OllamaApi};
use config::GatewayConfig;
use tracing::info;

pub fn build_state(config: GatewayConfig) -> Result<state::AppState, std::io::Error> {
    let client = OllamaClient::new(&config).map_err(std::io::Error::other)?;
    info!(
        backend = client.name(),
        base_url = %client.base_url(),
        default_model = %config.default_model,
        chat_timeout_secs = config.chat_timeout.as_secs(),
        probe_timeout_secs = config.probe_timeout.as_secs(),
        stream_mode = ?config.stream_mode,
        "ollama backend configured"
    );
    Ok(state::AppState::new(Arc::new(client), config))
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .with_state(state)
}
