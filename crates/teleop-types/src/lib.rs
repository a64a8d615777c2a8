//! Shared types for teleop.
//!
//! This crate contains all types shared across the teleop workspace:
//! actor roles, validated motion commands, the wire message and response
//! variants, and handshake statistics.

pub mod actor;
pub mod command;
pub mod message;
pub mod stats;

pub use actor::Actor;
pub use command::{Angle, Command, CommandError, Speed};
pub use message::{Message, MessageError, RefusalReason, Response};
pub use stats::{HandshakeStats, HANDSHAKE_THRESHOLD, RTT_OUTLIER_MARGIN_MS};
