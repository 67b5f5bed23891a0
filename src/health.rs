use serde::Serialize;
use tracing::warn;

use crate::backend::{BackendError, OllamaApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendLink {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama: Option<BackendLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn check_health(backend: &dyn OllamaApi) -> HealthReport {
    match backend.probe().await {
        Ok(()) => HealthReport {
            status: HealthStatus::Healthy,
            ollama: Some(BackendLink::Connected),
            error: None,
        },
        Err(error @ BackendError::Status { .. }) | Err(error @ BackendError::InvalidResponse(_)) => {
            warn!(backend = backend.name(), error = %error, "health probe rejected");
            HealthReport {
                status: HealthStatus::Unhealthy,
                ollama: Some(BackendLink::Disconnected),
                error: Some(error.to_string()),
            }
        }
        Err(error) => {
            warn!(backend = backend.name(), error = %error, "health probe failed");
            HealthReport {
                status: HealthStatus::Unhealthy,
                ollama: None,
                error: Some(error.to_string()),
            }
        }
    }
}
