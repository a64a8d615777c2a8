//! Per-connection phase machine (relay side).

/// Lifecycle stage of one role's connection on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Socket open, no successful authorization yet.
    Idle,
    /// Authorized, waiting for the peer role to appear.
    Authorized,
    /// Both roles present, probes are being exchanged.
    Handshaking,
    /// Probing complete, commands are forwarded.
    Operating,
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Authorized,
    Reset,
    PeerConnected,
    PeerDisconnected,
    StartOperating,
}

/// Pure reducer over every `(phase, event)` pair.
pub fn transition(phase: Phase, event: PhaseEvent) -> Phase {
    match (phase, event) {
        (_, PhaseEvent::Reset) => Phase::Idle,

        (Phase::Idle, PhaseEvent::Authorized) => Phase::Authorized,
        (
            Phase::Idle,
            PhaseEvent::PeerConnected | PhaseEvent::PeerDisconnected | PhaseEvent::StartOperating,
        ) => Phase::Idle,

        (Phase::Authorized, PhaseEvent::PeerConnected) => Phase::Handshaking,
        (
            Phase::Authorized,
            PhaseEvent::Authorized | PhaseEvent::PeerDisconnected | PhaseEvent::StartOperating,
        ) => Phase::Authorized,

        (Phase::Handshaking, PhaseEvent::StartOperating) => Phase::Operating,
        (Phase::Handshaking, PhaseEvent::PeerDisconnected) => Phase::Authorized,
        (Phase::Handshaking, PhaseEvent::Authorized | PhaseEvent::PeerConnected) => {
            Phase::Handshaking
        }

        (Phase::Operating, PhaseEvent::PeerDisconnected) => Phase::Authorized,
        (
            Phase::Operating,
            PhaseEvent::Authorized | PhaseEvent::PeerConnected | PhaseEvent::StartOperating,
        ) => Phase::Operating,
    }
}

impl Phase {
    /// Whether this connection has passed authorization.
    pub fn is_authorized(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Whether the pair is formed and traffic may be routed.
    pub fn is_paired(self) -> bool {
        matches!(self, Self::Handshaking | Self::Operating)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Authorized => write!(f, "Authorized"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Operating => write!(f, "Operating"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 4] = [
        Phase::Idle,
        Phase::Authorized,
        Phase::Handshaking,
        Phase::Operating,
    ];

    #[test]
    fn happy_path() {
        let phase = transition(Phase::Idle, PhaseEvent::Authorized);
        assert_eq!(phase, Phase::Authorized);
        let phase = transition(phase, PhaseEvent::PeerConnected);
        assert_eq!(phase, Phase::Handshaking);
        let phase = transition(phase, PhaseEvent::StartOperating);
        assert_eq!(phase, Phase::Operating);
    }

    #[test]
    fn reset_always_returns_to_idle() {
        for phase in ALL_PHASES {
            assert_eq!(transition(phase, PhaseEvent::Reset), Phase::Idle);
        }
    }

    #[test]
    fn peer_disconnect_demotes_to_waiting() {
        assert_eq!(
            transition(Phase::Handshaking, PhaseEvent::PeerDisconnected),
            Phase::Authorized
        );
        assert_eq!(
            transition(Phase::Operating, PhaseEvent::PeerDisconnected),
            Phase::Authorized
        );
        assert_eq!(
            transition(Phase::Authorized, PhaseEvent::PeerDisconnected),
            Phase::Authorized
        );
    }

    #[test]
    fn idle_ignores_everything_but_authorization() {
        for event in [
            PhaseEvent::PeerConnected,
            PhaseEvent::PeerDisconnected,
            PhaseEvent::StartOperating,
        ] {
            assert_eq!(transition(Phase::Idle, event), Phase::Idle);
        }
    }

    #[test]
    fn cannot_skip_handshake() {
        assert_eq!(
            transition(Phase::Authorized, PhaseEvent::StartOperating),
            Phase::Authorized
        );
    }

    #[test]
    fn repeated_events_are_self_transitions() {
        assert_eq!(
            transition(Phase::Authorized, PhaseEvent::Authorized),
            Phase::Authorized
        );
        assert_eq!(
            transition(Phase::Handshaking, PhaseEvent::PeerConnected),
            Phase::Handshaking
        );
        assert_eq!(
            transition(Phase::Operating, PhaseEvent::StartOperating),
            Phase::Operating
        );
    }

    #[test]
    fn predicates() {
        assert!(!Phase::Idle.is_authorized());
        assert!(Phase::Authorized.is_authorized());
        assert!(!Phase::Authorized.is_paired());
        assert!(Phase::Handshaking.is_paired());
        assert!(Phase::Operating.is_paired());
    }
}
