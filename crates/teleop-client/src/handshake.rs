//! Probe scheduling for the link handshake.

use teleop_types::HandshakeStats;

/// What the supervisor should do after the stats changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Send the next probe.
    Probe,
    /// Enough acks arrived; stop probing and start operating.
    StartOperating,
    /// A probe is in flight.
    Wait,
}

/// Decide the next step from the current statistics.
pub fn next_step(stats: &HandshakeStats) -> HandshakeStep {
    if stats.is_complete() {
        HandshakeStep::StartOperating
    } else if stats.is_awaiting_ack {
        HandshakeStep::Wait
    } else {
        HandshakeStep::Probe
    }
}
