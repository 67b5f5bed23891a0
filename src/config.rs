use std::{
    env,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use thiserror::Error;
use tracing::warn;

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama2";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Reject,
    Downgrade,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OLLAMA_BASE_URL must be an absolute http(s) URL, got {0:?}")]
    InvalidBaseUrl(String),
    #[error("GATEWAY_STREAM_MODE must be `reject` or `downgrade`, got {0:?}")]
    InvalidStreamMode(String),
    #[error("GATEWAY_HOST must be an IP address, got {0:?}")]
    InvalidBindAddr(String),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub ollama_base_url: String,
    pub default_model: String,
    pub bind_addr: SocketAddr,
    pub chat_timeout: Duration,
    pub probe_timeout: Duration,
    pub stream_mode: StreamMode,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_owned(),
            default_model: DEFAULT_MODEL.to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            chat_timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            stream_mode: StreamMode::Reject,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let ollama_base_url = var("OLLAMA_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        validate_base_url(&ollama_base_url)?;

        let default_model = var("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        let host = var("GATEWAY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = parse_or_default(var("GATEWAY_PORT"), "GATEWAY_PORT", DEFAULT_PORT);
        let bind_addr = host
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, port))
            .map_err(|_| ConfigError::InvalidBindAddr(host.clone()))?;

        let chat_timeout_secs = parse_or_default(
            var("OLLAMA_CHAT_TIMEOUT_SECS"),
            "OLLAMA_CHAT_TIMEOUT_SECS",
            DEFAULT_CHAT_TIMEOUT_SECS,
        );
        let probe_timeout_secs = parse_or_default(
            var("OLLAMA_PROBE_TIMEOUT_SECS"),
            "OLLAMA_PROBE_TIMEOUT_SECS",
            DEFAULT_PROBE_TIMEOUT_SECS,
        );

        let stream_mode = match var("GATEWAY_STREAM_MODE") {
            None => StreamMode::Reject,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "reject" => StreamMode::Reject,
                "downgrade" => StreamMode::Downgrade,
                _ => return Err(ConfigError::InvalidStreamMode(value)),
            },
        };

        Ok(Self {
            ollama_base_url,
            default_model,
            bind_addr,
            chat_timeout: Duration::from_secs(chat_timeout_secs),
            probe_timeout: Duration::from_secs(probe_timeout_secs),
            stream_mode,
        })
    }
}

fn validate_base_url(url: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(ConfigError::InvalidBaseUrl(url.to_owned())),
    }
}

fn parse_or_default<T>(value: Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match value {
        None => default,
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable config value, using default");
            default
        }),
    }
}
