//! Client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] teleop_protocol::ProtocolError),

    #[error("account error: {0}")]
    Account(String),

    #[error("client supervisor has stopped")]
    Stopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
