//! Session authority: who holds each role, pairing, and routing.
//!
//! The authority is plain state owned by the relay event loop. It never
//! touches a socket directly; every outgoing frame goes through the
//! per-socket [`Outbound`] channel so the loop never blocks on a slow peer.

use std::collections::HashMap;

use teleop_protocol::wire;
use teleop_types::{Actor, Command, HandshakeStats, Message, Response};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::auth::{AuthError, Identity};
use crate::liveness::{AuthDeadline, LivenessMonitor, LivenessSettings};
use crate::state::{transition, Phase, PhaseEvent};

/// Identifies one accepted socket. Assigned on open, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work for a socket's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded JSON text frame.
    Frame(String),
    /// Transport-level ping.
    Ping,
    /// Close the socket.
    Close,
}

fn deliver(outbound: &UnboundedSender<Outbound>, response: &Response) {
    match wire::encode_response(response) {
        Ok(frame) => {
            if outbound.send(Outbound::Frame(frame)).is_err() {
                debug!("socket writer gone, dropping response");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode response"),
    }
}

/// An authorized connection bound to a role.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    phase: Phase,
    stats: HandshakeStats,
    outbound: UnboundedSender<Outbound>,
    liveness: Option<LivenessMonitor>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> HandshakeStats {
        self.stats
    }

    fn apply(&mut self, event: PhaseEvent) {
        let next = transition(self.phase, event);
        if next != self.phase {
            debug!(id = %self.id, from = %self.phase, to = %next, ?event, "phase change");
            self.phase = next;
        }
    }

    fn send(&self, response: &Response) {
        deliver(&self.outbound, response);
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Free,
    /// Authorization for this socket is in flight.
    Claimed(ConnectionId),
    Bound(Connection),
}

impl Slot {
    fn owner(&self) -> Option<ConnectionId> {
        match self {
            Self::Free => None,
            Self::Claimed(id) => Some(*id),
            Self::Bound(conn) => Some(conn.id),
        }
    }

    fn bound(&self) -> Option<&Connection> {
        match self {
            Self::Bound(conn) => Some(conn),
            _ => None,
        }
    }

    fn bound_mut(&mut self) -> Option<&mut Connection> {
        match self {
            Self::Bound(conn) => Some(conn),
            _ => None,
        }
    }
}

/// An open socket. Until it binds a role it carries an [`AuthDeadline`].
#[derive(Debug)]
struct OpenSocket {
    outbound: UnboundedSender<Outbound>,
    deadline: Option<AuthDeadline>,
}

/// A credential check the caller must run and report back through
/// [`SessionAuthority::complete_authorization`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub id: ConnectionId,
    pub actor: Actor,
    pub token: String,
}

/// Owns both role slots and every open socket.
pub struct SessionAuthority {
    sockets: HashMap<ConnectionId, OpenSocket>,
    ui: Slot,
    robot: Slot,
    liveness: LivenessSettings,
    epoch: Instant,
    /// Last command forwarded to the Robot, echoed back to the UI on ack.
    last_command: Option<(Command, u64)>,
}

impl SessionAuthority {
    pub fn new(liveness: LivenessSettings) -> Self {
        Self {
            sockets: HashMap::new(),
            ui: Slot::Free,
            robot: Slot::Free,
            liveness,
            epoch: Instant::now(),
            last_command: None,
        }
    }

    // -- Queries --

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Phase of the connection bound to `actor`, if any.
    pub fn phase(&self, actor: Actor) -> Option<Phase> {
        self.slot(actor).bound().map(Connection::phase)
    }

    pub fn stats(&self, actor: Actor) -> Option<HandshakeStats> {
        self.slot(actor).bound().map(Connection::stats)
    }

    pub fn identity(&self, actor: Actor) -> Option<Identity> {
        self.slot(actor).bound().map(Connection::identity)
    }

    /// Whether `actor` is claimed or bound by some socket.
    pub fn is_occupied(&self, actor: Actor) -> bool {
        self.slot(actor).owner().is_some()
    }

    // -- Socket lifecycle --

    pub fn connection_opened(&mut self, id: ConnectionId, outbound: UnboundedSender<Outbound>) {
        debug!(%id, "socket opened");
        let deadline = AuthDeadline::spawn(self.liveness.auth_timeout, outbound.clone());
        self.sockets.insert(
            id,
            OpenSocket {
                outbound,
                deadline: Some(deadline),
            },
        );
    }

    /// Release whatever the socket held and tell its peer.
    pub fn connection_closed(&mut self, id: ConnectionId) {
        if self.sockets.remove(&id).is_none() {
            return;
        }

        for role in [Actor::Ui, Actor::Robot] {
            let slot = self.slot_mut(role);
            if slot.owner() != Some(id) {
                continue;
            }
            let was_bound = matches!(slot, Slot::Bound(_));
            *slot = Slot::Free;
            if was_bound {
                info!(%id, %role, "connection closed, role released");
                self.unpair(role.peer());
            } else {
                debug!(%id, %role, "connection closed during authorization");
            }
        }
    }

    pub fn record_pong(&mut self, id: ConnectionId) {
        if let Some(conn) = self.robot.bound().filter(|c| c.id == id) {
            if let Some(liveness) = &conn.liveness {
                liveness.record_pong();
            }
        }
    }

    /// Ask every open socket to close.
    pub fn shutdown(&mut self) {
        for socket in self.sockets.values() {
            let _ = socket.outbound.send(Outbound::Close);
        }
    }

    // -- Inbound frames --

    /// Handle one text frame from socket `id`.
    ///
    /// Returns an [`AuthRequest`] when the frame claimed a free role.
    pub fn handle_frame(&mut self, id: ConnectionId, frame: &str) -> Option<AuthRequest> {
        if !self.sockets.contains_key(&id) {
            debug!(%id, "frame from unknown socket");
            return None;
        }

        let msg = match wire::decode_message(frame) {
            Ok(msg) => msg,
            Err(e) if e.is_malformed_frame() => {
                debug!(%id, error = %e, "ignoring malformed frame");
                return None;
            }
            Err(e) => {
                warn!(%id, error = %e, "failed to decode frame");
                return None;
            }
        };

        match self.bound_role(id) {
            None => self.handle_unbound(id, msg),
            Some(role) if msg.sender() != role => {
                warn!(%id, %role, sender = %msg.sender(), "sender does not match socket role, ignoring");
                None
            }
            Some(role) => {
                self.handle_bound(role, msg);
                None
            }
        }
    }

    /// Finish an authorization started by [`Self::handle_frame`].
    ///
    /// Results for sockets that closed or lost their claim are dropped.
    pub fn complete_authorization(
        &mut self,
        id: ConnectionId,
        actor: Actor,
        result: Result<Identity, AuthError>,
    ) {
        if !matches!(self.slot(actor), Slot::Claimed(owner) if *owner == id) {
            debug!(%id, %actor, "stale authorization result, dropping");
            return;
        }
        let Some(socket) = self.sockets.get_mut(&id) else {
            *self.slot_mut(actor) = Slot::Free;
            return;
        };
        let outbound = socket.outbound.clone();

        match result {
            Err(e) => {
                info!(%id, %actor, reason = %e, "authorization refused");
                *self.slot_mut(actor) = Slot::Free;
                deliver(&outbound, &Response::forbidden(e.to_string()));
            }
            Ok(identity) => {
                if socket.deadline.take().is_some() {
                    trace!(%id, "auth deadline cleared");
                }
                let liveness = (actor == Actor::Robot)
                    .then(|| LivenessMonitor::spawn(self.liveness, outbound.clone()));
                let mut conn = Connection {
                    id,
                    identity,
                    phase: Phase::Idle,
                    stats: HandshakeStats::default(),
                    outbound,
                    liveness,
                };
                conn.apply(PhaseEvent::Authorized);
                conn.send(&Response::Authorized);
                info!(%id, %actor, %identity, "authorized");

                *self.slot_mut(actor) = Slot::Bound(conn);
                self.pair_if_ready();
            }
        }
    }

    fn handle_unbound(&mut self, id: ConnectionId, msg: Message) -> Option<AuthRequest> {
        let Message::Authorization { from, access_token } = msg else {
            debug!(%id, kind = msg.kind(), "ignoring message before authorization");
            return None;
        };

        if self.ui.owner() == Some(id) || self.robot.owner() == Some(id) {
            debug!(%id, "authorization already in progress, ignoring");
            return None;
        }

        if self.slot(from).owner().is_some() {
            info!(%id, role = %from, "role already taken, refusing");
            if let Some(socket) = self.sockets.get(&id) {
                deliver(&socket.outbound, &Response::busy());
            }
            return None;
        }

        *self.slot_mut(from) = Slot::Claimed(id);
        Some(AuthRequest {
            id,
            actor: from,
            token: access_token,
        })
    }

    fn handle_bound(&mut self, role: Actor, msg: Message) {
        match msg {
            Message::Authorization { .. } => debug!(%role, "already authorized, ignoring"),
            Message::Reset { .. } => {
                if let Some(conn) = self.slot_mut(role).bound_mut() {
                    info!(id = %conn.id, %role, "reset requested, closing connection");
                    conn.apply(PhaseEvent::Reset);
                    let _ = conn.outbound.send(Outbound::Close);
                }
            }
            Message::Handshaking { time, .. } => self.route_probe(time),
            Message::Command { command, time, .. } => self.route_command(command, time),
            Message::Ack { .. } => self.route_ack(),
        }
    }

    // -- Pairing --

    fn pair_if_ready(&mut self) {
        let (Some(ui), Some(robot)) = (self.ui.bound_mut(), self.robot.bound_mut()) else {
            return;
        };
        if ui.phase != Phase::Authorized || robot.phase != Phase::Authorized {
            return;
        }

        for conn in [ui, robot] {
            conn.stats = HandshakeStats::default();
            conn.apply(PhaseEvent::PeerConnected);
            conn.send(&Response::PeerConnected);
        }
        self.last_command = None;
        info!("UI and Robot paired, handshaking");
    }

    fn unpair(&mut self, remaining: Actor) {
        self.last_command = None;
        if let Some(peer) = self.slot_mut(remaining).bound_mut() {
            let was_paired = peer.phase.is_paired();
            peer.apply(PhaseEvent::PeerDisconnected);
            peer.stats = HandshakeStats::default();
            if was_paired {
                peer.send(&Response::PeerDisconnected);
                info!(role = %remaining, "peer disconnected, waiting for a new one");
            }
        }
    }

    // -- Routing --

    fn route_probe(&mut self, time: u64) {
        let now = self.now_ms();
        let (Some(ui), Some(robot)) = (self.ui.bound_mut(), self.robot.bound()) else {
            debug!("no robot connected, dropping probe");
            return;
        };
        if !(ui.phase.is_paired() && robot.phase.is_paired()) {
            debug!("pair not formed, dropping probe");
            return;
        }

        ui.stats.register_sent(now);
        robot.send(&Response::Handshaking { time });
    }

    fn route_command(&mut self, command: Command, time: u64) {
        let (Some(ui), Some(robot)) = (self.ui.bound(), self.robot.bound()) else {
            debug!("no robot connected, dropping command");
            return;
        };
        if !(ui.phase.is_paired() && robot.phase.is_paired()) {
            debug!("pair not formed, dropping command");
            return;
        }

        trace!(%command, time, "forwarding command");
        robot.send(&Response::Command { command, time });
        self.last_command = Some((command, time));
    }

    fn route_ack(&mut self) {
        let now = self.now_ms();
        let (Some(ui), Some(robot)) = (self.ui.bound_mut(), self.robot.bound_mut()) else {
            debug!("no UI connected, dropping ack");
            return;
        };

        match (ui.phase, robot.phase) {
            (Phase::Handshaking, Phase::Handshaking) => {
                let Some(rtt) = ui.stats.register_ack(now) else {
                    debug!("ack with no probe in flight, dropping");
                    return;
                };
                trace!(rtt, count = ui.stats.received_count, "probe acknowledged");
                if ui.stats.is_complete() {
                    ui.apply(PhaseEvent::StartOperating);
                    robot.apply(PhaseEvent::StartOperating);
                    info!(
                        min_rtt = ui.stats.min_rtt,
                        max_rtt = ui.stats.max_rtt,
                        "handshake complete, operating"
                    );
                }
                ui.send(&Response::Ack);
            }
            (Phase::Operating, Phase::Operating) => {
                let echo = match self.last_command {
                    Some((command, time)) => Response::Command { command, time },
                    None => Response::Ack,
                };
                ui.send(&echo);
            }
            _ => debug!("ack outside of a paired session, dropping"),
        }
    }

    // -- Helpers --

    fn slot(&self, actor: Actor) -> &Slot {
        match actor {
            Actor::Ui => &self.ui,
            Actor::Robot => &self.robot,
        }
    }

    fn slot_mut(&mut self, actor: Actor) -> &mut Slot {
        match actor {
            Actor::Ui => &mut self.ui,
            Actor::Robot => &mut self.robot,
        }
    }

    fn bound_role(&self, id: ConnectionId) -> Option<Actor> {
        [Actor::Ui, Actor::Robot]
            .into_iter()
            .find(|role| self.slot(*role).bound().is_some_and(|c| c.id == id))
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use teleop_types::{RefusalReason, HANDSHAKE_THRESHOLD};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;

    struct Socket {
        id: ConnectionId,
        rx: UnboundedReceiver<Outbound>,
    }

    impl Socket {
        fn open(authority: &mut SessionAuthority) -> Self {
            let id = ConnectionId::new();
            let (tx, rx) = mpsc::unbounded_channel();
            authority.connection_opened(id, tx);
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                out.push(item);
            }
            out
        }

        fn responses(&mut self) -> Vec<Response> {
            self.drain()
                .into_iter()
                .filter_map(|o| match o {
                    Outbound::Frame(text) => Some(wire::decode_response(&text).unwrap()),
                    _ => None,
                })
                .collect()
        }
    }

    fn frame(msg: &Message) -> String {
        wire::encode_message(msg).unwrap()
    }

    fn authority() -> SessionAuthority {
        SessionAuthority::new(LivenessSettings::default())
    }

    fn authorize(authority: &mut SessionAuthority, socket: &Socket, actor: Actor) {
        let identity = match actor {
            Actor::Ui => Identity::User(1),
            Actor::Robot => Identity::Robot,
        };
        let request = authority
            .handle_frame(socket.id, &frame(&Message::authorization(actor, "t")))
            .unwrap();
        assert_eq!(request.actor, actor);
        authority.complete_authorization(request.id, actor, Ok(identity));
    }

    fn paired() -> (SessionAuthority, Socket, Socket) {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);
        let mut robot = Socket::open(&mut authority);
        authorize(&mut authority, &ui, Actor::Ui);
        authorize(&mut authority, &robot, Actor::Robot);
        ui.drain();
        robot.drain();
        (authority, ui, robot)
    }

    fn finish_handshake(authority: &mut SessionAuthority, ui: &Socket, robot: &Socket) {
        for i in 0..u64::from(HANDSHAKE_THRESHOLD) {
            authority.handle_frame(ui.id, &frame(&Message::probe(i)));
            authority.handle_frame(robot.id, &frame(&Message::ack()));
        }
    }

    #[tokio::test]
    async fn authorization_claims_role_and_replies() {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);

        let request = authority
            .handle_frame(ui.id, &frame(&Message::authorization(Actor::Ui, "tok")))
            .unwrap();
        assert_eq!(request.token, "tok");
        assert!(authority.is_occupied(Actor::Ui));
        assert_eq!(authority.phase(Actor::Ui), None);

        authority.complete_authorization(ui.id, Actor::Ui, Ok(Identity::User(5)));
        assert_eq!(ui.responses(), vec![Response::Authorized]);
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Authorized));
        assert_eq!(authority.identity(Actor::Ui), Some(Identity::User(5)));
    }

    #[tokio::test]
    async fn second_claim_is_busy_while_first_is_pending() {
        let mut authority = authority();
        let first = Socket::open(&mut authority);
        let mut second = Socket::open(&mut authority);

        assert!(authority
            .handle_frame(first.id, &frame(&Message::authorization(Actor::Ui, "a")))
            .is_some());
        assert!(authority
            .handle_frame(second.id, &frame(&Message::authorization(Actor::Ui, "b")))
            .is_none());

        let responses = second.responses();
        assert_eq!(responses.len(), 1);
        assert!(matches!(
            &responses[0],
            Response::Refused { reason: RefusalReason::ConnectionBusy, message }
                if message == "Someone else is already connected"
        ));
    }

    #[tokio::test]
    async fn second_robot_is_busy_and_first_is_untouched() {
        let (mut authority, _ui, mut robot) = paired();
        let mut intruder = Socket::open(&mut authority);

        assert!(authority
            .handle_frame(intruder.id, &frame(&Message::authorization(Actor::Robot, "s")))
            .is_none());
        assert_eq!(intruder.responses(), vec![Response::busy()]);
        assert!(robot.drain().is_empty());
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Handshaking));
    }

    #[tokio::test]
    async fn failed_authorization_frees_role() {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);

        authority.handle_frame(ui.id, &frame(&Message::authorization(Actor::Ui, "bad")));
        authority.complete_authorization(ui.id, Actor::Ui, Err(AuthError::Expired));

        assert_eq!(
            ui.responses(),
            vec![Response::forbidden("Your access token is expired")]
        );
        assert!(!authority.is_occupied(Actor::Ui));

        // The same socket may retry
        assert!(authority
            .handle_frame(ui.id, &frame(&Message::authorization(Actor::Ui, "good")))
            .is_some());
    }

    #[tokio::test]
    async fn stale_authorization_result_is_dropped() {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);
        authority.handle_frame(ui.id, &frame(&Message::authorization(Actor::Ui, "t")));

        authority.connection_closed(ui.id);
        assert!(!authority.is_occupied(Actor::Ui));

        authority.complete_authorization(ui.id, Actor::Ui, Ok(Identity::User(1)));
        assert!(!authority.is_occupied(Actor::Ui));
        assert!(ui.responses().is_empty());
    }

    #[tokio::test]
    async fn pairing_happens_once_both_are_authorized() {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);
        let mut robot = Socket::open(&mut authority);

        authorize(&mut authority, &ui, Actor::Ui);
        assert_eq!(ui.responses(), vec![Response::Authorized]);

        authorize(&mut authority, &robot, Actor::Robot);
        assert_eq!(ui.responses(), vec![Response::PeerConnected]);
        assert_eq!(
            robot.responses(),
            vec![Response::Authorized, Response::PeerConnected]
        );
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Handshaking));
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Handshaking));
    }

    #[tokio::test]
    async fn messages_before_authorization_are_ignored() {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);

        assert!(authority.handle_frame(ui.id, &frame(&Message::probe(1))).is_none());
        assert!(authority
            .handle_frame(ui.id, &frame(&Message::Reset { from: Actor::Ui }))
            .is_none());
        assert!(ui.drain().is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let (mut authority, mut ui, mut robot) = paired();
        for bad in [
            "",
            "{",
            r#"{"type":"Teleport","from":"UI"}"#,
            r#"{"type":"Ack","from":"UI"}"#,
            r#"{"type":"Authorization","from":"UI","accessToken":""}"#,
        ] {
            assert!(authority.handle_frame(ui.id, bad).is_none());
        }
        assert!(ui.drain().is_empty());
        assert!(robot.drain().is_empty());
    }

    #[tokio::test]
    async fn probe_is_forwarded_and_ack_returned() {
        let (mut authority, mut ui, mut robot) = paired();

        authority.handle_frame(ui.id, &frame(&Message::probe(42)));
        assert_eq!(robot.responses(), vec![Response::Handshaking { time: 42 }]);
        assert!(authority.stats(Actor::Ui).unwrap().is_awaiting_ack);

        authority.handle_frame(robot.id, &frame(&Message::ack()));
        assert_eq!(ui.responses(), vec![Response::Ack]);
        let stats = authority.stats(Actor::Ui).unwrap();
        assert_eq!(stats.received_count, 1);
        assert!(!stats.is_awaiting_ack);
    }

    #[tokio::test]
    async fn hundred_acks_start_operating() {
        let (mut authority, mut ui, robot) = paired();

        for i in 0..u64::from(HANDSHAKE_THRESHOLD) - 1 {
            authority.handle_frame(ui.id, &frame(&Message::probe(i)));
            authority.handle_frame(robot.id, &frame(&Message::ack()));
        }
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Handshaking));

        authority.handle_frame(ui.id, &frame(&Message::probe(99)));
        authority.handle_frame(robot.id, &frame(&Message::ack()));
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Operating));
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Operating));

        let responses = ui.responses();
        assert_eq!(responses.len(), HANDSHAKE_THRESHOLD as usize);
        assert!(responses.iter().all(|r| *r == Response::Ack));
    }

    #[tokio::test]
    async fn stray_ack_during_handshake_is_dropped() {
        let (mut authority, mut ui, robot) = paired();

        authority.handle_frame(ui.id, &frame(&Message::probe(0)));
        authority.handle_frame(robot.id, &frame(&Message::ack()));
        authority.handle_frame(robot.id, &frame(&Message::ack()));
        assert_eq!(ui.responses(), vec![Response::Ack]);
        assert_eq!(authority.stats(Actor::Ui).unwrap().received_count, 1);

        for i in 1..u64::from(HANDSHAKE_THRESHOLD) {
            authority.handle_frame(ui.id, &frame(&Message::probe(i)));
            authority.handle_frame(robot.id, &frame(&Message::ack()));
        }
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Operating));
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Operating));
        assert_eq!(ui.responses().len(), HANDSHAKE_THRESHOLD as usize - 1);
    }

    #[tokio::test]
    async fn commands_are_forwarded_and_echoed() {
        let (mut authority, mut ui, mut robot) = paired();
        finish_handshake(&mut authority, &ui, &robot);
        ui.drain();
        robot.drain();

        let command = Command::new(0.5, 90).unwrap();
        authority.handle_frame(ui.id, &frame(&Message::command(command, 1234)));
        assert_eq!(
            robot.responses(),
            vec![Response::Command {
                command,
                time: 1234
            }]
        );

        authority.handle_frame(robot.id, &frame(&Message::ack()));
        assert_eq!(
            ui.responses(),
            vec![Response::Command {
                command,
                time: 1234
            }]
        );
    }

    #[tokio::test]
    async fn sender_must_own_its_role() {
        let (mut authority, mut ui, mut robot) = paired();

        // The UI socket claiming to be the Robot
        authority.handle_frame(ui.id, &frame(&Message::ack()));
        authority.handle_frame(ui.id, &frame(&Message::Reset { from: Actor::Robot }));
        assert!(ui.drain().is_empty());
        assert!(robot.drain().is_empty());
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Handshaking));
    }

    #[tokio::test]
    async fn reset_closes_only_the_owner() {
        let (mut authority, mut ui, mut robot) = paired();
        let mut stranger = Socket::open(&mut authority);

        authority.handle_frame(stranger.id, &frame(&Message::Reset { from: Actor::Robot }));
        assert!(robot.drain().is_empty());
        assert!(stranger.drain().is_empty());

        authority.handle_frame(robot.id, &frame(&Message::Reset { from: Actor::Robot }));
        assert_eq!(robot.drain(), vec![Outbound::Close]);
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Idle));
        assert!(ui.drain().is_empty());

        // The writer closes the socket and the loop reports it
        authority.connection_closed(robot.id);
        assert_eq!(ui.responses(), vec![Response::PeerDisconnected]);
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Authorized));
    }

    #[tokio::test]
    async fn close_demotes_peer_and_clears_stats() {
        let (mut authority, mut ui, mut robot) = paired();
        finish_handshake(&mut authority, &ui, &robot);
        ui.drain();
        robot.drain();

        authority.connection_closed(robot.id);
        assert_eq!(ui.responses(), vec![Response::PeerDisconnected]);
        assert_eq!(authority.phase(Actor::Ui), Some(Phase::Authorized));
        assert_eq!(authority.stats(Actor::Ui), Some(HandshakeStats::default()));
        assert!(!authority.is_occupied(Actor::Robot));

        // A new robot pairs again from scratch
        let mut next = Socket::open(&mut authority);
        authorize(&mut authority, &next, Actor::Robot);
        assert_eq!(ui.responses(), vec![Response::PeerConnected]);
        assert_eq!(
            next.responses(),
            vec![Response::Authorized, Response::PeerConnected]
        );
        assert!(robot.drain().is_empty());
    }

    #[tokio::test]
    async fn ui_close_releases_ui_role() {
        let (mut authority, ui, mut robot) = paired();
        authority.connection_closed(ui.id);
        assert!(!authority.is_occupied(Actor::Ui));
        assert_eq!(robot.responses(), vec![Response::PeerDisconnected]);
        assert_eq!(authority.phase(Actor::Robot), Some(Phase::Authorized));
        assert_eq!(authority.socket_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_socket_is_closed_after_deadline() {
        let mut authority = authority();
        let mut ui = Socket::open(&mut authority);
        let mut idle = Socket::open(&mut authority);
        authorize(&mut authority, &ui, Actor::Ui);
        ui.drain();

        let start = Instant::now();
        assert_eq!(idle.rx.recv().await, Some(Outbound::Close));
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(ui.drain().is_empty());
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        assert_ne!(a, ConnectionId::new());
        assert_eq!(a.to_string().len(), 36);
    }

    #[tokio::test]
    async fn shutdown_closes_every_socket() {
        let (mut authority, mut ui, mut robot) = paired();
        let mut idle = Socket::open(&mut authority);
        authority.shutdown();
        for socket in [&mut ui, &mut robot, &mut idle] {
            assert_eq!(socket.drain(), vec![Outbound::Close]);
        }
    }
}
