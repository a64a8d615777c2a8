//! WebSocket connection and frame handling.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use teleop_types::{Message, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::wire;

/// A socket accepted by the relay.
pub type ServerSocket = PeerSocket<TcpStream>;

/// A socket opened by a UI or Robot client.
pub type ClientSocket = PeerSocket<MaybeTlsStream<TcpStream>>;

/// Send half of a [`ClientSocket`].
pub type ClientSender = FrameSender<MaybeTlsStream<TcpStream>>;

/// Receive half of a [`ClientSocket`].
pub type ClientReceiver = FrameReceiver<MaybeTlsStream<TcpStream>>;

/// An upgraded WebSocket connection to a remote teleop peer.
pub struct PeerSocket<S> {
    stream: WebSocketStream<S>,
    remote: Option<SocketAddr>,
}

impl<S> PeerSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: WebSocketStream<S>, remote: Option<SocketAddr>) -> Self {
        Self { stream, remote }
    }

    /// Get the remote address of this connection, when known.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Split into independently owned send and receive halves.
    pub fn split(self) -> (FrameSender<S>, FrameReceiver<S>) {
        let (sink, stream) = self.stream.split();
        (FrameSender { sink }, FrameReceiver { stream })
    }
}

/// Sends JSON text frames and control frames over a WebSocket.
pub struct FrameSender<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

impl<S> FrameSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send an already encoded text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), ProtocolError> {
        let len = text.len();
        self.sink.send(WsMessage::Text(text)).await?;
        trace!(len, "sent frame");
        Ok(())
    }

    /// Encode and send a client message.
    pub async fn send_message(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.send_text(wire::encode_message(msg)?).await
    }

    /// Encode and send a relay response.
    pub async fn send_response(&mut self, response: &Response) -> Result<(), ProtocolError> {
        self.send_text(wire::encode_response(response)?).await
    }

    /// Send a transport-level ping.
    pub async fn ping(&mut self) -> Result<(), ProtocolError> {
        self.sink.send(WsMessage::Ping(Vec::new())).await?;
        trace!("sent ping");
        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        match self.sink.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Something read off the socket that the caller has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame, not yet decoded.
    Text(String),
    /// Reply to one of our pings.
    Pong,
}

/// Receives frames from a WebSocket.
pub struct FrameReceiver<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> FrameReceiver<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Receive the next text frame or pong.
    ///
    /// Returns `None` once the peer has closed the connection. Pings are
    /// answered by tungstenite and never surface here.
    pub async fn recv(&mut self) -> Result<Option<Incoming>, ProtocolError> {
        loop {
            let Some(frame) = self.stream.next().await else {
                return Ok(None);
            };

            match frame {
                Ok(WsMessage::Text(text)) => return Ok(Some(Incoming::Text(text))),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(Incoming::Text(text))),
                    Err(_) => debug!("dropping non-UTF-8 binary frame"),
                },
                Ok(WsMessage::Pong(_)) => return Ok(Some(Incoming::Pong)),
                Ok(WsMessage::Ping(_) | WsMessage::Frame(_)) => {}
                Ok(WsMessage::Close(_))
                | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive the next relay response, skipping pongs and malformed frames.
    pub async fn recv_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        while let Some(incoming) = self.recv().await? {
            let Incoming::Text(text) = incoming else {
                continue;
            };
            match wire::decode_response(&text) {
                Ok(response) => return Ok(Some(response)),
                Err(e) if e.is_malformed_frame() => {
                    debug!(error = %e, "dropping malformed response");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Receive the next client message, skipping pongs and malformed frames.
    pub async fn recv_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        while let Some(incoming) = self.recv().await? {
            let Incoming::Text(text) = incoming else {
                continue;
            };
            match wire::decode_message(&text) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) if e.is_malformed_frame() => {
                    debug!(error = %e, "dropping malformed message");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
