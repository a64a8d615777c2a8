//! Relay configuration loaded from TOML.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl Config {
    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.auth.token_secret.is_empty() {
            return Err(RelayError::Config("auth.token_secret must be set".to_string()));
        }
        if self.auth.robot_secret.is_empty() {
            return Err(RelayError::Config("auth.robot_secret must be set".to_string()));
        }
        if self.liveness.ping_interval_secs == 0
            || self.liveness.pong_timeout_secs == 0
            || self.liveness.auth_timeout_secs == 0
        {
            return Err(RelayError::Config(
                "liveness intervals must be non-zero".to_string(),
            ));
        }
        self.relay.socket_addr().map(|_| ())
    }
}

/// Relay network and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl RelayConfig {
    /// The address to listen on.
    pub fn socket_addr(&self) -> Result<SocketAddr, RelayError> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid bind address {}: {e}", self.bind)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

/// Credentials the relay checks against.
///
/// Both secrets may also come from the environment; see
/// [`crate::setup::load_config`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify UI bearer tokens.
    #[serde(default)]
    pub token_secret: String,
    /// Shared secret the Robot presents as its access token.
    #[serde(default)]
    pub robot_secret: String,
}

/// Robot keep-alive settings, plus the time a fresh socket gets to
/// authorize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
}

impl LivenessConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
        }
    }
}

/// A user allowed to operate the robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: u64,
    pub username: String,
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_pong_timeout_secs() -> u64 {
    10
}

fn default_auth_timeout_secs() -> u64 {
    10
}
