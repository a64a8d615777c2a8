//! Simulated robot.
//!
//! Authorizes with the shared secret, acknowledges every probe and command,
//! and logs what it would drive. Reconnects after a delay whenever the
//! socket drops or the Robot slot is busy.

use std::time::Duration;

use anyhow::bail;
use teleop_types::{Actor, Message, RefusalReason, Response};
use tracing::{debug, info, warn};

enum SessionEnd {
    Closed,
    Refused { reason: RefusalReason, message: String },
}

pub async fn run(url: &str, secret: &str, reconnect: Duration) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            result = session(url, secret) => match result {
                Ok(SessionEnd::Closed) => info!("relay closed the connection"),
                Ok(SessionEnd::Refused { reason: RefusalReason::Forbidden, message }) => {
                    bail!("relay rejected the robot secret: {message}");
                }
                Ok(SessionEnd::Refused { reason, message }) => {
                    warn!(%reason, %message, "authorization refused");
                }
                Err(e) => warn!(error = %e, "robot session failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl-C, shutting down");
                return Ok(());
            }
        }

        info!(secs = reconnect.as_secs(), "reconnecting after backoff");
        tokio::select! {
            () = tokio::time::sleep(reconnect) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn session(url: &str, secret: &str) -> anyhow::Result<SessionEnd> {
    let (mut tx, mut rx) = teleop_protocol::connect(url).await?.split();
    info!(url, "connected to relay");
    tx.send_message(&Message::authorization(Actor::Robot, secret))
        .await?;

    while let Some(response) = rx.recv_response().await? {
        match response {
            Response::Authorized => info!("authorized, waiting for an operator"),
            Response::Refused { reason, message } => {
                let _ = tx.close().await;
                return Ok(SessionEnd::Refused { reason, message });
            }
            Response::PeerConnected => info!("operator connected"),
            Response::PeerDisconnected => info!("operator disconnected"),
            Response::Handshaking { time } => {
                debug!(time, "probe");
                tx.send_message(&Message::ack()).await?;
            }
            Response::Command { command, .. } => {
                info!(%command, "driving");
                tx.send_message(&Message::ack()).await?;
            }
            Response::Ack => debug!("ignoring ack"),
        }
    }

    Ok(SessionEnd::Closed)
}
