//! Client configuration loaded from TOML.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ClientError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Delay before reconnecting after the socket closes.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    /// Command sampling period.
    #[serde(default = "default_command_interval_ms")]
    pub command_interval_ms: u64,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "relay url must be ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.command_interval_ms == 0 {
            return Err(ClientError::Config(
                "command_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            command_interval_ms: default_command_interval_ms(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8080".to_string()
}

fn default_reconnect_backoff_secs() -> u64 {
    10
}

fn default_command_interval_ms() -> u64 {
    100
}

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<ClientConfig, ClientError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ClientError::Config(format!("failed to read config: {e}")))?;
        let config: ClientConfig = toml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(ClientConfig::default())
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("teleop")
        .join("client.toml")
}
