//! Round-trip statistics gathered during the link handshake.

use serde::{Deserialize, Serialize};

/// Number of acknowledged probes required before operation may begin.
pub const HANDSHAKE_THRESHOLD: u32 = 100;

/// A sample larger than `max_rtt` plus this margin is treated as an outlier
/// and does not raise `max_rtt`.
pub const RTT_OUTLIER_MARGIN_MS: u64 = 1000;

/// Probe/ack bookkeeping for one connection.
///
/// Timestamps are milliseconds on the owner's monotonic clock. `min_rtt` and
/// `max_rtt` are only meaningful once `received_count > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeStats {
    pub received_count: u32,
    pub min_rtt: u64,
    pub max_rtt: u64,
    pub last_sent_at: u64,
    pub is_awaiting_ack: bool,
}

impl HandshakeStats {
    /// Record that a probe left at `at`.
    pub fn register_sent(&mut self, at: u64) {
        self.last_sent_at = at;
        self.is_awaiting_ack = true;
    }

    /// Record the acknowledgment of the outstanding probe.
    ///
    /// Returns the measured round-trip time, or `None` for a stray ack that
    /// arrived with nothing in flight.
    pub fn register_ack(&mut self, at: u64) -> Option<u64> {
        if !self.is_awaiting_ack {
            return None;
        }

        let rtt = at.saturating_sub(self.last_sent_at);
        self.record_rtt(rtt);
        self.received_count += 1;
        self.is_awaiting_ack = false;
        Some(rtt)
    }

    /// Fold one round-trip sample into `min_rtt`/`max_rtt`.
    pub fn record_rtt(&mut self, rtt: u64) {
        if self.received_count == 0 {
            self.min_rtt = rtt;
            self.max_rtt = rtt;
            return;
        }

        self.min_rtt = self.min_rtt.min(rtt);
        if rtt > self.max_rtt && rtt <= self.max_rtt + RTT_OUTLIER_MARGIN_MS {
            self.max_rtt = rtt;
        }
    }

    /// Whether enough probes have been acknowledged to start operating.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received_count >= HANDSHAKE_THRESHOLD
    }
}
