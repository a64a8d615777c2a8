//! Role-specific authentication.
//!
//! A UI presents an HS256 bearer token whose subject must exist in the
//! [`UserDirectory`]. A Robot presents the shared robot secret. Both are
//! behind the [`Authenticator`] trait so the session authority can pick the
//! strategy from the `from` field of the Authorization message.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use teleop_types::Actor;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, UserConfig};

/// Who a socket turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    User(u64),
    Robot,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Robot => write!(f, "robot"),
        }
    }
}

/// Why an Authorization was refused.
///
/// The display text is sent to the client verbatim inside
/// `Refused { reason: Forbidden, message }`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Your login credentials are invalid")]
    InvalidCredentials,

    #[error("Your access token is expired")]
    Expired,

    #[error("Your token is invalid")]
    WrongTokenType,

    #[error("Unknown user")]
    UnknownUser,

    #[error("Invalid robot secret")]
    InvalidSecret,
}

/// A credential check for one role.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Kind of bearer token, as carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    UserAccess,
    UserRefresh,
}

/// Claims carried by a UI bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub id: u64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies UI bearer tokens and resolves their user.
pub struct TokenAuthenticator {
    key: DecodingKey,
    validation: Validation,
    users: Arc<dyn UserDirectory>,
}

impl TokenAuthenticator {
    pub fn new(secret: &[u8], users: Arc<dyn UserDirectory>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            users,
        }
    }

    /// Check signature, expiry, and token type. Returns the user id.
    pub fn verify_token(&self, token: &str) -> Result<u64, AuthError> {
        let data = decode::<TokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidCredentials,
            }
        })?;

        if data.claims.token_type != TokenType::UserAccess {
            return Err(AuthError::WrongTokenType);
        }
        Ok(data.claims.id)
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let id = self.verify_token(token)?;
        match self.users.find_user(id).await? {
            Some(user) => {
                debug!(id = user.id, username = %user.username, "user authenticated");
                Ok(Identity::User(user.id))
            }
            None => Err(AuthError::UnknownUser),
        }
    }
}

/// Accepts exactly one shared secret and identifies the caller as the Robot.
pub struct SharedSecretAuthenticator {
    secret: String,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        if token == self.secret {
            Ok(Identity::Robot)
        } else {
            Err(AuthError::InvalidSecret)
        }
    }
}

/// A user known to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub username: String,
}

/// Lookup of users by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: u64) -> Result<Option<User>, AuthError>;
}

/// Fixed user table, typically loaded from the `[[users]]` config section.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<u64, User>,
}

impl InMemoryUserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        Self::new(users.iter().map(|u| User {
            id: u.id,
            username: u.username.clone(),
        }))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: u64) -> Result<Option<User>, AuthError> {
        Ok(self.users.get(&id).cloned())
    }
}

/// One authenticator per role.
#[derive(Clone)]
pub struct Authenticators {
    ui: Arc<dyn Authenticator>,
    robot: Arc<dyn Authenticator>,
}

impl Authenticators {
    pub fn new(ui: Arc<dyn Authenticator>, robot: Arc<dyn Authenticator>) -> Self {
        Self { ui, robot }
    }

    /// Build the token and shared-secret authenticators from config.
    pub fn from_config(config: &Config) -> Self {
        let users = Arc::new(InMemoryUserDirectory::from_config(&config.users));
        Self {
            ui: Arc::new(TokenAuthenticator::new(
                config.auth.token_secret.as_bytes(),
                users,
            )),
            robot: Arc::new(SharedSecretAuthenticator::new(
                config.auth.robot_secret.clone(),
            )),
        }
    }

    pub fn for_actor(&self, actor: Actor) -> Arc<dyn Authenticator> {
        match actor {
            Actor::Ui => Arc::clone(&self.ui),
            Actor::Robot => Arc::clone(&self.robot),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn sign(token_type: TokenType, id: u64, exp: u64, secret: &[u8]) -> String {
        let claims = TokenClaims { token_type, id, exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn authenticator() -> TokenAuthenticator {
        let users = InMemoryUserDirectory::new([User {
            id: 7,
            username: "alice".to_string(),
        }]);
        TokenAuthenticator::new(SECRET, Arc::new(users))
    }

    #[tokio::test]
    async fn valid_access_token_is_accepted() {
        let token = sign(TokenType::UserAccess, 7, now_secs() + 3600, SECRET);
        let identity = authenticator().authenticate(&token).await.unwrap();
        assert_eq!(identity, Identity::User(7));
    }

    #[tokio::test]
    async fn refresh_token_is_rejected() {
        let token = sign(TokenType::UserRefresh, 7, now_secs() + 3600, SECRET);
        let err = authenticator().authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthError::WrongTokenType);
        assert_eq!(err.to_string(), "Your token is invalid");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = sign(TokenType::UserAccess, 7, now_secs() - 3600, SECRET);
        let err = authenticator().authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthError::Expired);
        assert_eq!(err.to_string(), "Your access token is expired");
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let token = sign(TokenType::UserAccess, 7, now_secs() + 3600, b"other");
        let err = authenticator().authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), "Your login credentials are invalid");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let err = authenticator().authenticate("abc").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let token = sign(TokenType::UserAccess, 99, now_secs() + 3600, SECRET);
        let err = authenticator().authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthError::UnknownUser);
    }

    #[tokio::test]
    async fn robot_secret() {
        let auth = SharedSecretAuthenticator::new("s3cret");
        assert_eq!(auth.authenticate("s3cret").await.unwrap(), Identity::Robot);
        assert_eq!(
            auth.authenticate("guess").await.unwrap_err(),
            AuthError::InvalidSecret
        );
    }

    #[tokio::test]
    async fn authenticators_select_by_role() {
        let mut config = Config::default();
        config.auth.token_secret = "jwt".to_string();
        config.auth.robot_secret = "robot".to_string();
        config.users.push(UserConfig {
            id: 1,
            username: "op".to_string(),
        });
        let auth = Authenticators::from_config(&config);

        let robot = auth.for_actor(Actor::Robot);
        assert_eq!(robot.authenticate("robot").await.unwrap(), Identity::Robot);

        let token = sign(TokenType::UserAccess, 1, now_secs() + 60, b"jwt");
        let ui = auth.for_actor(Actor::Ui);
        assert_eq!(ui.authenticate(&token).await.unwrap(), Identity::User(1));
        // The robot secret is not a valid UI credential
        assert!(ui.authenticate("robot").await.is_err());
    }

    #[test]
    fn claims_use_wire_names() {
        let claims = TokenClaims {
            token_type: TokenType::UserAccess,
            id: 3,
            exp: 10,
        };
        let value = toml::Value::try_from(&claims).unwrap();
        assert_eq!(value["type"].as_str(), Some("USER_ACCESS"));
    }

    #[test]
    fn identity_display() {
        assert_eq!(Identity::User(4).to_string(), "user:4");
        assert_eq!(Identity::Robot.to_string(), "robot");
    }

    #[tokio::test]
    async fn directory_from_config() {
        let users = InMemoryUserDirectory::from_config(&[UserConfig {
            id: 2,
            username: "bob".to_string(),
        }]);
        let bob = users.find_user(2).await.unwrap().unwrap();
        assert_eq!(bob.username, "bob");
        assert!(users.find_user(3).await.unwrap().is_none());
    }
}
