//! Client Connection Supervisor.
//!
//! Owns the one socket to the relay and the client phase. Each socket runs
//! through [`Supervisor::drive`]: authorize, wait for the peer, probe until
//! the handshake completes, then forward commands. When the socket ends the
//! supervisor either reconnects after the backoff, reconnects at once (reset),
//! or parks in the `Error` phase until the operator resets it.

use std::sync::Arc;

use teleop_protocol::{ClientReceiver, ClientSender, ProtocolError};
use teleop_types::{Actor, Command, Message, RefusalReason, Response};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::account::{AccountService, Credentials};
use crate::command::{CommandRelay, Dispatch};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::handshake::{self, HandshakeStep};
use crate::state::{transition, ClientEvent, ClientPhase};

#[derive(Debug)]
enum Control {
    Submit(Command),
    Reset,
    Shutdown,
}

/// How one socket's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Closed by the relay or the network.
    Closed,
    /// The operator asked for a fresh connection.
    Reset,
    /// The relay refused us for good.
    Refused,
    Shutdown,
}

/// Cloneable handle for talking to a running [`Supervisor`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    control: mpsc::UnboundedSender<Control>,
    status: watch::Receiver<ClientPhase>,
}

impl ClientHandle {
    /// Current phase snapshot.
    pub fn status(&self) -> ClientPhase {
        self.status.borrow().clone()
    }

    /// Subscribe to phase changes.
    pub fn status_receiver(&self) -> watch::Receiver<ClientPhase> {
        self.status.clone()
    }

    /// Submit an operator command. Dropped unless operating.
    pub fn submit_command(&self, command: Command) -> Result<(), ClientError> {
        self.send(Control::Submit(command))
    }

    /// Send `Reset`, drop the socket, and reconnect at once.
    ///
    /// This is also the way out of the `Error` phase.
    pub fn reset(&self) -> Result<(), ClientError> {
        self.send(Control::Reset)
    }

    pub fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown);
    }

    fn send(&self, control: Control) -> Result<(), ClientError> {
        self.control.send(control).map_err(|_| ClientError::Stopped)
    }
}

pub struct Supervisor {
    config: ClientConfig,
    account: Arc<dyn AccountService>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    status_tx: watch::Sender<ClientPhase>,
    phase: ClientPhase,
    relay: CommandRelay,
    epoch: Instant,
}

impl Supervisor {
    pub fn new(config: ClientConfig, account: Arc<dyn AccountService>) -> (Self, ClientHandle) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientPhase::Connecting);
        let relay = CommandRelay::new(config.command_interval());
        let supervisor = Self {
            config,
            account,
            control_rx,
            status_tx,
            phase: ClientPhase::Connecting,
            relay,
            epoch: Instant::now(),
        };
        let handle = ClientHandle {
            control: control_tx,
            status: status_rx,
        };
        (supervisor, handle)
    }

    /// Create a supervisor and run it on its own task.
    pub fn spawn(
        config: ClientConfig,
        account: Arc<dyn AccountService>,
    ) -> (ClientHandle, JoinHandle<Result<(), ClientError>>) {
        let (supervisor, handle) = Self::new(config, account);
        (handle, tokio::spawn(supervisor.run()))
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) -> Result<(), ClientError> {
        self.config.validate()?;

        loop {
            let exit = match teleop_protocol::connect(&self.config.url).await {
                Ok(socket) => {
                    info!(url = %self.config.url, "connected to relay");
                    let (tx, rx) = socket.split();
                    self.drive(tx, rx).await
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "failed to connect to relay");
                    Exit::Closed
                }
            };
            self.relay.cancel();

            match exit {
                Exit::Shutdown => break,
                Exit::Reset => self.apply(ClientEvent::Reset),
                Exit::Closed => {
                    self.apply(ClientEvent::Reset);
                    if !self.backoff().await {
                        break;
                    }
                }
                Exit::Refused => {
                    if !self.wait_for_reset().await {
                        break;
                    }
                    self.apply(ClientEvent::Reset);
                }
            }
        }

        info!("client supervisor stopped");
        Ok(())
    }

    /// Serve one socket until it ends.
    async fn drive(&mut self, mut tx: ClientSender, mut rx: ClientReceiver) -> Exit {
        self.apply(ClientEvent::Connected);

        let credentials = match self.account.credentials().await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "no credentials available");
                self.refuse(RefusalReason::Forbidden, e.to_string());
                let _ = tx.close().await;
                return Exit::Refused;
            }
        };
        match self.authorize(&mut tx, credentials).await {
            Ok(None) => {}
            Ok(Some(exit)) => {
                let _ = tx.close().await;
                return exit;
            }
            Err(e) => {
                warn!(error = %e, "failed to send authorization");
                return Exit::Closed;
            }
        }

        let mut refreshed = false;
        let mut ticker = time::interval(self.relay.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let resend_at = self.relay.resend_deadline();
            let result = tokio::select! {
                incoming = rx.recv_response() => match incoming {
                    Ok(Some(response)) => self.on_response(response, &mut tx, &mut refreshed).await,
                    Ok(None) => {
                        info!("relay closed the connection");
                        return Exit::Closed;
                    }
                    Err(e) => {
                        warn!(error = %e, "connection to relay failed");
                        return Exit::Closed;
                    }
                },
                control = self.control_rx.recv() => match control {
                    Some(Control::Submit(command)) => self.submit(command, &mut tx).await.map(|()| None),
                    Some(Control::Reset) => {
                        info!("reset requested");
                        let _ = tx.send_message(&Message::Reset { from: Actor::Ui }).await;
                        let _ = tx.close().await;
                        return Exit::Reset;
                    }
                    Some(Control::Shutdown) | None => {
                        let _ = tx.close().await;
                        return Exit::Shutdown;
                    }
                },
                _ = ticker.tick() => self.on_tick(&mut tx).await.map(|()| None),
                () = sleep_until(resend_at) => self.on_resend(&mut tx).await.map(|()| None),
            };

            match result {
                Ok(None) => {}
                Ok(Some(exit)) => {
                    let _ = tx.close().await;
                    return exit;
                }
                Err(e) => {
                    warn!(error = %e, "failed to send to relay");
                    return Exit::Closed;
                }
            }
        }
    }

    async fn authorize(
        &mut self,
        tx: &mut ClientSender,
        credentials: Credentials,
    ) -> Result<Option<Exit>, ProtocolError> {
        if credentials.access_token.is_empty() {
            self.refuse(RefusalReason::Forbidden, "Missing access token".to_string());
            return Ok(Some(Exit::Refused));
        }
        tx.send_message(&Message::authorization(Actor::Ui, credentials.access_token))
            .await?;
        Ok(None)
    }

    async fn on_response(
        &mut self,
        response: Response,
        tx: &mut ClientSender,
        refreshed: &mut bool,
    ) -> Result<Option<Exit>, ProtocolError> {
        match response {
            Response::Authorized => {
                info!("authorized");
                self.apply(ClientEvent::Authorized);
            }
            Response::Refused {
                reason: RefusalReason::Forbidden,
                message,
            } => {
                if *refreshed {
                    warn!(%message, "authorization refused after token refresh");
                    self.refuse(RefusalReason::Forbidden, message);
                    return Ok(Some(Exit::Refused));
                }
                *refreshed = true;

                info!(%message, "authorization refused, refreshing token");
                match self.account.refresh().await {
                    Ok(credentials) => return self.authorize(tx, credentials).await,
                    Err(e) => {
                        warn!(error = %e, "token refresh failed");
                        self.refuse(RefusalReason::Forbidden, message);
                        return Ok(Some(Exit::Refused));
                    }
                }
            }
            Response::Refused { reason, message } => {
                warn!(%reason, %message, "authorization refused");
                self.refuse(reason, message);
                return Ok(Some(Exit::Refused));
            }
            Response::PeerConnected => {
                info!("peer connected, starting handshake");
                self.relay.cancel();
                self.apply(ClientEvent::PeerConnected);
                self.advance_handshake(tx).await?;
            }
            Response::PeerDisconnected => {
                info!("peer disconnected, waiting for a new one");
                self.relay.cancel();
                self.apply(ClientEvent::PeerDisconnected);
            }
            Response::Ack | Response::Handshaking { .. } | Response::Command { .. } => {
                let at = self.now_ms();
                self.apply(ClientEvent::RegisterAck { at });
                self.advance_handshake(tx).await?;
            }
        }
        Ok(None)
    }

    async fn advance_handshake(&mut self, tx: &mut ClientSender) -> Result<(), ProtocolError> {
        let stats = match &self.phase {
            ClientPhase::Handshaking(stats) => *stats,
            _ => return Ok(()),
        };

        match handshake::next_step(&stats) {
            HandshakeStep::Probe => {
                let at = self.now_ms();
                tx.send_message(&Message::probe(at)).await?;
                self.apply(ClientEvent::RegisterHandshakeSent { at });
            }
            HandshakeStep::StartOperating => {
                info!(
                    min_rtt = stats.min_rtt,
                    max_rtt = stats.max_rtt,
                    "handshake complete, operating"
                );
                self.apply(ClientEvent::StartOperating);
            }
            HandshakeStep::Wait => {}
        }
        Ok(())
    }

    async fn submit(&mut self, command: Command, tx: &mut ClientSender) -> Result<(), ProtocolError> {
        if !self.phase.is_operating() {
            debug!(%command, phase = %self.phase, "not operating, dropping command");
            return Ok(());
        }

        match self.relay.submit(command, Instant::now()) {
            Dispatch::Immediate(command) => self.send_command(command, tx).await,
            Dispatch::Coalesce(command) => {
                self.apply(ClientEvent::RegisterCommand(command));
                Ok(())
            }
        }
    }

    async fn on_tick(&mut self, tx: &mut ClientSender) -> Result<(), ProtocolError> {
        let ClientPhase::Operating { link, .. } = &self.phase else {
            return Ok(());
        };
        match CommandRelay::sample(link) {
            Some(command) => self.send_command(command, tx).await,
            None => Ok(()),
        }
    }

    async fn on_resend(&mut self, tx: &mut ClientSender) -> Result<(), ProtocolError> {
        match self.relay.take_resend(Instant::now()) {
            Some(command) if self.phase.is_operating() => {
                debug!(%command, "resending stop");
                self.send_command(command, tx).await
            }
            _ => Ok(()),
        }
    }

    async fn send_command(
        &mut self,
        command: Command,
        tx: &mut ClientSender,
    ) -> Result<(), ProtocolError> {
        let at = self.now_ms();
        tx.send_message(&Message::command(command, at)).await?;
        debug!(%command, at, "command sent");
        self.apply(ClientEvent::RegisterCommandSent { command, at });
        Ok(())
    }

    /// Wait out the reconnect backoff. Returns `false` on shutdown.
    async fn backoff(&mut self) -> bool {
        let delay = self.config.reconnect_backoff();
        info!(secs = delay.as_secs(), "reconnecting after backoff");
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                control = self.control_rx.recv() => match control {
                    Some(Control::Reset) => return true,
                    Some(Control::Submit(command)) => debug!(%command, "not connected, dropping command"),
                    Some(Control::Shutdown) | None => return false,
                },
            }
        }
    }

    /// Park in the `Error` phase. Returns `false` on shutdown.
    async fn wait_for_reset(&mut self) -> bool {
        loop {
            match self.control_rx.recv().await {
                Some(Control::Reset) => return true,
                Some(Control::Submit(command)) => {
                    debug!(%command, "refused by relay, dropping command");
                }
                Some(Control::Shutdown) | None => return false,
            }
        }
    }

    fn refuse(&mut self, reason: RefusalReason, message: String) {
        self.apply(ClientEvent::Error { reason, message });
    }

    fn apply(&mut self, event: ClientEvent) {
        let previous = std::mem::take(&mut self.phase);
        let from = previous.name();
        self.phase = transition(previous, event);
        if self.phase.name() != from {
            info!(from, to = %self.phase, "phase change");
        }

        let phase = &self.phase;
        self.status_tx.send_if_modified(|current| {
            if *current == *phase {
                false
            } else {
                current.clone_from(phase);
                true
            }
        });
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
