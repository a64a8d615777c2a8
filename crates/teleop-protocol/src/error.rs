//! Protocol and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("deserialisation error: {0}")]
    Deserialization(String),

    #[error("frame size {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] teleop_types::MessageError),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProtocolError {
    /// Whether the frame itself was bad, as opposed to the transport failing.
    ///
    /// Malformed frames are dropped without tearing down the connection.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            Self::Deserialization(_) | Self::FrameTooLarge { .. } | Self::InvalidMessage(_)
        )
    }
}
