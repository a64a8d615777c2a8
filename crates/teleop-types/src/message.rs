//! Protocol message types.
//!
//! Messages travel from a client (UI or Robot) to the relay; responses travel
//! from the relay to a client. Every frame carries a `type` discriminator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actor::Actor;
use crate::command::Command;

/// A message that decoded as JSON but violates the protocol's sender rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("{kind} messages must come from {expected}, got {actual}")]
    UnexpectedSender {
        kind: &'static str,
        expected: Actor,
        actual: Actor,
    },

    #[error("access token must not be empty")]
    EmptyAccessToken,
}

/// Client-to-relay message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// First frame on every socket: claim a role with a credential.
    Authorization {
        from: Actor,
        #[serde(rename = "accessToken")]
        access_token: String,
    },

    /// Release the sender's slot and close its socket.
    Reset { from: Actor },

    /// Timestamped link probe (UI only).
    Handshaking { from: Actor, time: u64 },

    /// Motion command (UI only).
    Command {
        from: Actor,
        command: Command,
        time: u64,
    },

    /// Acknowledgment of the last probe or command (Robot only).
    Ack { from: Actor },
}

impl Message {
    #[must_use]
    pub fn authorization(from: Actor, access_token: impl Into<String>) -> Self {
        Self::Authorization {
            from,
            access_token: access_token.into(),
        }
    }

    #[must_use]
    pub fn probe(time: u64) -> Self {
        Self::Handshaking {
            from: Actor::Ui,
            time,
        }
    }

    #[must_use]
    pub fn command(command: Command, time: u64) -> Self {
        Self::Command {
            from: Actor::Ui,
            command,
            time,
        }
    }

    #[must_use]
    pub fn ack() -> Self {
        Self::Ack { from: Actor::Robot }
    }

    /// The actor this message claims to come from.
    #[must_use]
    pub fn sender(&self) -> Actor {
        match self {
            Self::Authorization { from, .. }
            | Self::Reset { from }
            | Self::Handshaking { from, .. }
            | Self::Command { from, .. }
            | Self::Ack { from } => *from,
        }
    }

    /// Short name of the variant, as it appears in the `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authorization { .. } => "Authorization",
            Self::Reset { .. } => "Reset",
            Self::Handshaking { .. } => "Handshaking",
            Self::Command { .. } => "Command",
            Self::Ack { .. } => "Ack",
        }
    }

    /// Check the rules serde cannot express: fixed senders and non-empty tokens.
    pub fn validate(&self) -> Result<(), MessageError> {
        let expected = match self {
            Self::Authorization { access_token, .. } => {
                if access_token.is_empty() {
                    return Err(MessageError::EmptyAccessToken);
                }
                return Ok(());
            }
            Self::Reset { .. } => return Ok(()),
            Self::Handshaking { .. } | Self::Command { .. } => Actor::Ui,
            Self::Ack { .. } => Actor::Robot,
        };

        let actual = self.sender();
        if actual == expected {
            Ok(())
        } else {
            Err(MessageError::UnexpectedSender {
                kind: self.kind(),
                expected,
                actual,
            })
        }
    }
}

/// Why the relay refused an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefusalReason {
    /// The requested role is already taken by another socket.
    ConnectionBusy,
    /// The credential was rejected; recoverable by refreshing it.
    Forbidden,
}

impl std::fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionBusy => write!(f, "ConnectionBusy"),
            Self::Forbidden => write!(f, "Forbidden"),
        }
    }
}

/// Relay-to-client response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Authorized,

    Refused {
        reason: RefusalReason,
        message: String,
    },

    PeerConnected,

    PeerDisconnected,

    /// A probe forwarded to the Robot.
    Handshaking { time: u64 },

    /// A probe acknowledgment forwarded to the UI.
    Ack,

    /// A command forwarded to the Robot, or echoed back to the UI once the
    /// Robot acknowledged it.
    Command { command: Command, time: u64 },
}

impl Response {
    #[must_use]
    pub fn busy() -> Self {
        Self::Refused {
            reason: RefusalReason::ConnectionBusy,
            message: "Someone else is already connected".to_string(),
        }
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Refused {
            reason: RefusalReason::Forbidden,
            message: message.into(),
        }
    }

    /// Whether this response acknowledges the UI's last probe or command.
    #[must_use]
    pub fn is_acknowledgment(&self) -> bool {
        matches!(
            self,
            Self::Ack | Self::Handshaking { .. } | Self::Command { .. }
        )
    }
}
