//! Client-side phase machine.
//!
//! Richer than the relay's: it separates the connect and authorize steps,
//! carries the handshake statistics and the command link inside the phases
//! that use them, and has a terminal `Error` phase that only `Reset` leaves.

use teleop_types::{Command, HandshakeStats, RefusalReason};

/// Stop-and-wait bookkeeping for commands while operating.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommandLink {
    /// Most recent command not yet sent. Newer submissions overwrite it.
    pub pending: Option<Command>,
    pub is_awaiting_ack: bool,
    pub last_sent: Option<Command>,
    pub last_sent_at: u64,
    /// Round trip of the last acknowledged command, in milliseconds.
    pub last_rtt: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ClientPhase {
    #[default]
    Connecting,
    Authorizing,
    WaitingForPeer,
    Handshaking(HandshakeStats),
    Operating {
        stats: HandshakeStats,
        link: CommandLink,
    },
    Error {
        reason: RefusalReason,
        message: String,
    },
}

impl ClientPhase {
    pub fn is_operating(&self) -> bool {
        matches!(self, Self::Operating { .. })
    }

    /// Handshake statistics, when the pair is formed.
    pub fn stats(&self) -> Option<&HandshakeStats> {
        match self {
            Self::Handshaking(stats) | Self::Operating { stats, .. } => Some(stats),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Authorizing => "Authorizing",
            Self::WaitingForPeer => "WaitingForPeer",
            Self::Handshaking(_) => "Handshaking",
            Self::Operating { .. } => "Operating",
            Self::Error { .. } => "Error",
        }
    }
}

impl std::fmt::Display for ClientPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error { reason, message } => write!(f, "Error({reason}: {message})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Authorized,
    PeerConnected,
    PeerDisconnected,
    RegisterHandshakeSent { at: u64 },
    RegisterAck { at: u64 },
    StartOperating,
    RegisterCommand(Command),
    RegisterCommandSent { command: Command, at: u64 },
    Reset,
    Error {
        reason: RefusalReason,
        message: String,
    },
}

/// Pure reducer over every `(phase, event)` pair.
pub fn transition(phase: ClientPhase, event: ClientEvent) -> ClientPhase {
    use ClientEvent as E;
    use ClientPhase as P;

    match (phase, event) {
        (_, E::Reset) => P::Connecting,
        (phase @ P::Error { .. }, _) => phase,
        (_, E::Error { reason, message }) => P::Error { reason, message },

        (P::Connecting, E::Connected) => P::Authorizing,
        (P::Authorizing, E::Authorized) => P::WaitingForPeer,
        (P::WaitingForPeer, E::PeerConnected) => P::Handshaking(HandshakeStats::default()),

        (P::Handshaking(_) | P::Operating { .. }, E::PeerDisconnected) => P::WaitingForPeer,

        (P::Handshaking(mut stats), E::RegisterHandshakeSent { at }) => {
            stats.register_sent(at);
            P::Handshaking(stats)
        }
        (P::Handshaking(mut stats), E::RegisterAck { at }) => {
            stats.register_ack(at);
            P::Handshaking(stats)
        }
        (P::Handshaking(stats), E::StartOperating) if stats.is_complete() => P::Operating {
            stats,
            link: CommandLink::default(),
        },

        (P::Operating { stats, mut link }, E::RegisterCommand(command)) => {
            link.pending = Some(command);
            P::Operating { stats, link }
        }
        (P::Operating { stats, mut link }, E::RegisterCommandSent { command, at }) => {
            link.pending = None;
            link.is_awaiting_ack = true;
            link.last_sent = Some(command);
            link.last_sent_at = at;
            P::Operating { stats, link }
        }
        (P::Operating { stats, mut link }, E::RegisterAck { at }) => {
            if link.is_awaiting_ack {
                link.is_awaiting_ack = false;
                link.last_rtt = Some(at.saturating_sub(link.last_sent_at));
            }
            P::Operating { stats, link }
        }

        (phase, _) => phase,
    }
}
