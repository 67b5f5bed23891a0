use std::sync::Arc;

use crate::{backend::OllamaApi, config::GatewayConfig, metrics::AppMetrics};

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn OllamaApi>,
    pub config: Arc<GatewayConfig>,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn new<B>(backend: Arc<B>, config: GatewayConfig) -> Self
    where
        B: OllamaApi + 'static,
    {
        let backend: Arc<dyn OllamaApi> = backend;
        Self {
            backend,
            config: Arc::new(config),
            metrics: Arc::new(AppMetrics::new()),
        }
    }

    pub fn new_for_tests<B>(backend: Arc<B>) -> Self
    where
        B: OllamaApi + 'static,
    {
        Self::new(backend, GatewayConfig::default())
    }
}
