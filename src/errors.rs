use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::{backend::BackendError, translate::MappingError};

const UPSTREAM_FALLBACK_MESSAGE: &str = "Ollama service error";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },
    #[error("{0}")]
    BackendUnavailable(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn from_chat_failure(error: BackendError) -> Self {
        match error {
            BackendError::Connection(cause) | BackendError::Timeout(cause) => {
                AppError::BackendUnavailable(format!("Cannot connect to Ollama: {cause}"))
            }
            BackendError::Status { status, body } => AppError::Upstream { status, body },
            BackendError::InvalidResponse(cause) => {
                AppError::Internal(format!("Internal server error: {cause}"))
            }
        }
    }

    // Any backend refusal means the catalogue is unavailable.
    pub fn from_list_failure(error: BackendError) -> Self {
        match error {
            BackendError::Connection(cause) | BackendError::Timeout(cause) => {
                AppError::BackendUnavailable(format!("Cannot connect to Ollama: {cause}"))
            }
            BackendError::Status { status, .. } => AppError::BackendUnavailable(format!(
                "Ollama service unavailable: status {}",
                status.as_u16()
            )),
            BackendError::InvalidResponse(cause) => {
                AppError::Internal(format!("Error fetching models: {cause}"))
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidBody { status, .. } => *status,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { status, .. } => *status,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MappingError> for AppError {
    fn from(error: MappingError) -> Self {
        AppError::Internal(format!("Internal server error: {error}"))
    }
}

#[derive(Debug, Serialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiError,
}

#[derive(Debug, Serialize)]
struct OpenAiError {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::BadRequest(message) | AppError::InvalidBody { message, .. } => {
                make_error_response(status, "invalid_request_error", message)
            }
            AppError::BackendUnavailable(message) => {
                make_error_response(status, "backend_unavailable", message)
            }
            AppError::Upstream { body, .. } => {
                let message = if body.is_empty() {
                    UPSTREAM_FALLBACK_MESSAGE.to_owned()
                } else {
                    body
                };
                make_error_response(status, "upstream_error", message)
            }
            AppError::Internal(message) => make_error_response(status, "server_error", message),
        }
    }
}

fn make_error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    let payload = OpenAiErrorEnvelope {
        error: OpenAiError {
            message,
            error_type: error_type.to_owned(),
        },
    };

    (status, Json(payload)).into_response()
}
