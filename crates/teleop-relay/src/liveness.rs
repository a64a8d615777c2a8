//! Keep-alive monitor for the Robot connection.
//!
//! Every `ping_interval` the monitor clears its alive flag and asks the
//! socket writer to send a ping. If no pong has set the flag again after
//! `pong_timeout`, the socket is closed and the normal close path tears the
//! pair down.
//!
//! Sockets that have not bound a role yet get an [`AuthDeadline`] instead:
//! they are closed once `auth_timeout` passes without an authorization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::LivenessConfig;
use crate::session::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSettings {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub auth_timeout: Duration,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self::from(&LivenessConfig::default())
    }
}

impl From<&LivenessConfig> for LivenessSettings {
    fn from(config: &LivenessConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
            auth_timeout: config.auth_timeout(),
        }
    }
}

/// Running monitor. Dropping it stops the timer.
#[derive(Debug)]
pub struct LivenessMonitor {
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LivenessMonitor {
    /// Start monitoring the socket fed by `outbound`.
    pub fn spawn(settings: LivenessSettings, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run(settings, Arc::clone(&alive), outbound));
        Self { alive, task }
    }

    pub fn record_pong(&self) {
        self.alive.store(true, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Closes a socket that does not authorize in time. Dropping it disarms
/// the timer.
#[derive(Debug)]
pub struct AuthDeadline {
    task: JoinHandle<()>,
}

impl AuthDeadline {
    pub fn spawn(timeout: Duration, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        let task = tokio::spawn(async move {
            time::sleep(timeout).await;
            warn!(
                timeout_secs = timeout.as_secs(),
                "no authorization received, closing connection"
            );
            let _ = outbound.send(Outbound::Close);
        });
        Self { task }
    }
}

impl Drop for AuthDeadline {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    settings: LivenessSettings,
    alive: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Outbound>,
) {
    let mut ticker = time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        alive.store(false, Ordering::Release);
        if outbound.send(Outbound::Ping).is_err() {
            return;
        }
        debug!("liveness ping sent");

        time::sleep(settings.pong_timeout).await;
        if !alive.load(Ordering::Acquire) {
            warn!(
                timeout_secs = settings.pong_timeout.as_secs(),
                "no pong received, closing connection"
            );
            let _ = outbound.send(Outbound::Close);
            return;
        }
    }
}
