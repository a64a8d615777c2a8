//! Config loading and relay construction.

use std::path::{Path, PathBuf};

use teleop_protocol::WsTransport;
use tracing::info;

use crate::auth::Authenticators;
use crate::config::Config;
use crate::error::RelayError;
use crate::liveness::LivenessSettings;
use crate::relay::Relay;

/// Overrides `auth.token_secret` when set.
pub const TOKEN_SECRET_ENV: &str = "TELEOP_TOKEN_SECRET";

/// Overrides `auth.robot_secret` when set.
pub const ROBOT_SECRET_ENV: &str = "TELEOP_ROBOT_SECRET";

/// Load configuration from the given path, or the default location.
///
/// Secrets from the environment take precedence over the file.
pub fn load_config(path: Option<&str>) -> Result<Config, RelayError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    let mut config = read_config(&config_path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config, RelayError> {
    if !path.exists() {
        info!("no config file found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read config: {e}")))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| RelayError::Config(format!("failed to parse config: {e}")))?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Replace secrets with values from `lookup` where present and non-empty.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(secret) = lookup(TOKEN_SECRET_ENV).filter(|s| !s.is_empty()) {
        config.auth.token_secret = secret;
    }
    if let Some(secret) = lookup(ROBOT_SECRET_ENV).filter(|s| !s.is_empty()) {
        config.auth.robot_secret = secret;
    }
}

/// Validate `config`, bind its listener, and build a ready-to-run relay.
pub async fn build_relay(config: &Config) -> Result<Relay, RelayError> {
    config.validate()?;
    let transport = WsTransport::bind(config.relay.socket_addr()?).await?;
    Ok(Relay::new(
        transport,
        Authenticators::from_config(config),
        LivenessSettings::from(&config.liveness),
    ))
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("teleop")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("relay.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_secrets() {
        let mut config = Config::default();
        config.auth.robot_secret = "from-file".to_string();

        apply_env_overrides(&mut config, |key| match key {
            TOKEN_SECRET_ENV => Some("jwt".to_string()),
            ROBOT_SECRET_ENV => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.auth.token_secret, "jwt");
        // Empty values do not clobber the file
        assert_eq!(config.auth.robot_secret, "from-file");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = read_config(Path::new("/nonexistent/teleop/relay.toml")).unwrap();
        assert_eq!(config.relay.port, 8080);
    }

    #[test]
    fn default_path_is_under_config_dir() {
        let path = default_config_path();
        assert!(path.ends_with("teleop/relay.toml"));
    }

    #[tokio::test]
    async fn build_relay_rejects_missing_secrets() {
        let result = build_relay(&Config::default()).await;
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
