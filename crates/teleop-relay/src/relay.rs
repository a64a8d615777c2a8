//! Relay event loop.
//!
//! One task owns the [`SessionAuthority`]. Each accepted socket gets its own
//! task that upgrades it, forwards inbound frames as [`RelayEvent`]s, and
//! drains the socket's [`Outbound`] queue. Credential checks run on spawned
//! tasks and report back through the same event channel.

use std::net::SocketAddr;

use teleop_protocol::{Incoming, PendingSocket, ProtocolError, ServerSocket, WsTransport};
use teleop_types::Actor;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::auth::{AuthError, Authenticators, Identity};
use crate::error::RelayError;
use crate::liveness::LivenessSettings;
use crate::session::{AuthRequest, ConnectionId, Outbound, SessionAuthority};
use crate::state::Phase;

/// Events processed by the relay's main loop.
pub enum RelayEvent {
    /// A socket finished its WebSocket upgrade.
    Opened {
        id: ConnectionId,
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    /// A text frame arrived on a socket.
    Frame { id: ConnectionId, text: String },
    /// A pong arrived on a socket.
    Pong(ConnectionId),
    /// A socket closed, for any reason.
    Closed(ConnectionId),
    /// A credential check finished.
    AuthCompleted {
        id: ConnectionId,
        actor: Actor,
        result: Result<Identity, AuthError>,
    },
    /// Shutdown signal.
    Shutdown,
}

/// Snapshot of the relay published after every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatus {
    pub open_sockets: usize,
    pub ui: Option<Phase>,
    pub robot: Option<Phase>,
}

impl RelayStatus {
    /// Whether a UI and a Robot are bound and past the handshake.
    pub fn is_operating(&self) -> bool {
        self.ui == Some(Phase::Operating) && self.robot == Some(Phase::Operating)
    }
}

/// The teleop relay.
pub struct Relay {
    authority: SessionAuthority,
    authenticators: Authenticators,
    transport: Option<WsTransport>,
    event_tx: mpsc::Sender<RelayEvent>,
    event_rx: mpsc::Receiver<RelayEvent>,
    status_tx: watch::Sender<RelayStatus>,
}

impl Relay {
    /// Create a relay that accepts sockets from `transport`.
    pub fn new(
        transport: WsTransport,
        authenticators: Authenticators,
        liveness: LivenessSettings,
    ) -> Self {
        let mut relay = Self::detached(authenticators, liveness);
        relay.transport = Some(transport);
        relay
    }

    /// Create a relay with no listener. Sockets can only be fed in
    /// through [`Self::event_sender`].
    pub fn detached(authenticators: Authenticators, liveness: LivenessSettings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (status_tx, _) = watch::channel(RelayStatus::default());
        Self {
            authority: SessionAuthority::new(liveness),
            authenticators,
            transport: None,
            event_tx,
            event_rx,
            status_tx,
        }
    }

    /// Get a clone of the event sender for feeding events into the relay.
    pub fn event_sender(&self) -> mpsc::Sender<RelayEvent> {
        self.event_tx.clone()
    }

    /// Address of the listener, if this relay has one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(|t| t.local_addr().ok())
    }

    /// Subscribe to status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<RelayStatus> {
        self.status_tx.subscribe()
    }

    /// Run the relay event loop until shutdown.
    pub async fn run(&mut self) -> Result<(), RelayError> {
        if let Some(transport) = &self.transport {
            info!(addr = %transport.local_addr()?, "relay listening");
        }

        loop {
            tokio::select! {
                result = accept(self.transport.as_ref()) => {
                    match result {
                        Ok(pending) => spawn_socket(pending, self.event_tx.clone()),
                        Err(e) => debug!(error = %e, "accept error"),
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(RelayEvent::Shutdown) | None => {
                            info!("shutting down");
                            break;
                        }
                        Some(event) => self.handle_event(event),
                    }
                }
            }
            self.publish_status();
        }

        self.shutdown();
        Ok(())
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Opened { id, outbound } => self.authority.connection_opened(id, outbound),
            RelayEvent::Frame { id, text } => {
                if let Some(request) = self.authority.handle_frame(id, &text) {
                    self.spawn_authorization(request);
                }
            }
            RelayEvent::Pong(id) => self.authority.record_pong(id),
            RelayEvent::Closed(id) => self.authority.connection_closed(id),
            RelayEvent::AuthCompleted { id, actor, result } => {
                self.authority.complete_authorization(id, actor, result);
            }
            RelayEvent::Shutdown => {}
        }
    }

    fn spawn_authorization(&self, request: AuthRequest) {
        let authenticator = self.authenticators.for_actor(request.actor);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = authenticator.authenticate(&request.token).await;
            let _ = event_tx
                .send(RelayEvent::AuthCompleted {
                    id: request.id,
                    actor: request.actor,
                    result,
                })
                .await;
        });
    }

    fn publish_status(&self) {
        let status = RelayStatus {
            open_sockets: self.authority.socket_count(),
            ui: self.authority.phase(Actor::Ui),
            robot: self.authority.phase(Actor::Robot),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn shutdown(&mut self) {
        self.authority.shutdown();
        info!("relay stopped");
    }
}

async fn accept(transport: Option<&WsTransport>) -> Result<PendingSocket, ProtocolError> {
    match transport {
        Some(transport) => transport.accept().await,
        None => std::future::pending().await,
    }
}

fn spawn_socket(pending: PendingSocket, event_tx: mpsc::Sender<RelayEvent>) {
    tokio::spawn(async move {
        let remote = pending.remote_address();
        let socket = match pending.upgrade().await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(remote = %remote, error = %e, "WebSocket upgrade failed");
                return;
            }
        };

        let id = ConnectionId::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        if event_tx
            .send(RelayEvent::Opened {
                id,
                outbound: outbound_tx,
            })
            .await
            .is_err()
        {
            return;
        }
        info!(%id, remote = %remote, "socket connected");

        serve_socket(id, socket, outbound_rx, &event_tx).await;

        info!(%id, "socket disconnected");
        let _ = event_tx.send(RelayEvent::Closed(id)).await;
    });
}

async fn serve_socket(
    id: ConnectionId,
    socket: ServerSocket,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    event_tx: &mpsc::Sender<RelayEvent>,
) {
    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            incoming = rx.recv() => {
                let event = match incoming {
                    Ok(Some(Incoming::Text(text))) => RelayEvent::Frame { id, text },
                    Ok(Some(Incoming::Pong)) => RelayEvent::Pong(id),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(%id, error = %e, "socket read error");
                        break;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            work = outbound.recv() => {
                let result = match work {
                    Some(Outbound::Frame(text)) => tx.send_text(text).await,
                    Some(Outbound::Ping) => tx.ping().await,
                    Some(Outbound::Close) | None => {
                        let _ = tx.close().await;
                        break;
                    }
                };
                if let Err(e) = result {
                    warn!(%id, error = %e, "socket write error");
                    break;
                }
            }
        }
    }
}
