//! Relay errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] teleop_protocol::ProtocolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
