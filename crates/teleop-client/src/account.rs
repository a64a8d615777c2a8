//! Account collaborator: where the operator's bearer token comes from.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ClientError;

/// Bearer credentials for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

/// Source of credentials, and of fresh ones once the relay rejects them.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Current credentials.
    async fn credentials(&self) -> Result<Credentials, ClientError>;

    /// Exchange the refresh token for new credentials.
    async fn refresh(&self) -> Result<Credentials, ClientError>;
}

/// Fixed credentials that cannot be refreshed.
#[derive(Debug)]
pub struct StaticAccount {
    credentials: Mutex<Credentials>,
}

impl StaticAccount {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }

    /// Replace the stored credentials, e.g. after an out-of-band login.
    pub async fn replace(&self, credentials: Credentials) {
        *self.credentials.lock().await = credentials;
    }
}

#[async_trait]
impl AccountService for StaticAccount {
    async fn credentials(&self) -> Result<Credentials, ClientError> {
        Ok(self.credentials.lock().await.clone())
    }

    async fn refresh(&self) -> Result<Credentials, ClientError> {
        Err(ClientError::Account(
            "no refresh endpoint configured".to_string(),
        ))
    }
}
