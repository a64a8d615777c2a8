//! WebSocket transport: bind, accept, and connect.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::connection::{ClientSocket, PeerSocket, ServerSocket};
use crate::error::ProtocolError;

/// Listening side of the teleop transport, used by the relay.
pub struct WsTransport {
    listener: TcpListener,
}

impl WsTransport {
    /// Bind a TCP listener that accepts WebSocket upgrades.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        info!(addr = %addr, "WebSocket transport bound");
        Ok(Self { listener })
    }

    /// Accept a TCP connection without upgrading it yet.
    ///
    /// The upgrade involves a round trip with the client, so callers that
    /// serve many clients should run [`PendingSocket::upgrade`] on its own task.
    pub async fn accept(&self) -> Result<PendingSocket, ProtocolError> {
        let (stream, remote) = self
            .listener
            .accept()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        debug!(remote = %remote, "accepted TCP connection");
        Ok(PendingSocket { stream, remote })
    }

    /// Accept and upgrade in one step.
    pub async fn accept_upgraded(&self) -> Result<ServerSocket, ProtocolError> {
        self.accept().await?.upgrade().await
    }

    /// Get the local address this transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        self.listener
            .local_addr()
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }
}

/// A TCP connection waiting for its WebSocket upgrade.
pub struct PendingSocket {
    stream: TcpStream,
    remote: SocketAddr,
}

impl PendingSocket {
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Run the server side of the WebSocket handshake.
    pub async fn upgrade(self) -> Result<ServerSocket, ProtocolError> {
        let stream = tokio_tungstenite::accept_async(self.stream)
            .await
            .map_err(|e| ProtocolError::Handshake(e.to_string()))?;
        debug!(remote = %self.remote, "upgraded to WebSocket");
        Ok(PeerSocket::new(stream, Some(self.remote)))
    }
}

/// Connect to a relay at a `ws://` URL.
pub async fn connect(url: &str) -> Result<ClientSocket, ProtocolError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ProtocolError::Connection(e.to_string()))?;
    debug!(url, "connected to relay");
    Ok(PeerSocket::new(stream, None))
}
