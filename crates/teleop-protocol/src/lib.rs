//! WebSocket transport layer and wire protocol for teleop.
//!
//! This crate handles WebSocket connection management (via
//! tokio-tungstenite), JSON message encoding/decoding (via serde_json), and
//! the validation rules every inbound frame must pass.

pub mod connection;
pub mod error;
pub mod transport;
pub mod wire;

pub use connection::{
    ClientReceiver, ClientSender, ClientSocket, FrameReceiver, FrameSender, Incoming, PeerSocket,
    ServerSocket,
};
pub use error::ProtocolError;
pub use transport::{connect, PendingSocket, WsTransport};
