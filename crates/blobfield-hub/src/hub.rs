//! The hub: sole owner of sessions, world state and operator state.
//!
//! Every input is applied as one discrete step against `&mut Hub`, so
//! nothing ever observes a half-applied message or a half-blended tick.
//! [`crate::runner`] drives a hub from a single task.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blobfield_dna::{average, Identity, Intent, Signature};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::DEFAULT_TICK_INTERVAL;
use crate::operator::{OperatorAction, OperatorController, OperatorState};
use crate::protocol::{
    ClientMessage, PeerView, Presence, ServerMessage, TickFrame, Welcome, QUESTIONS,
};
use crate::session::{CapacityExceeded, Outbox, SessionId, SessionRegistry, DEFAULT_MAX_USERS};
use crate::world::WorldState;

/// Per-tick pull of each signature toward the lobby average.
pub const CROSS_INFLUENCE: f64 = 0.004;

/// Per-tick pull of each signature back toward its own target.
pub const IDENTITY_PULL: f64 = 0.012;

/// Hub tunables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum concurrent sessions
    pub max_users: usize,
    /// Time between simulation steps
    pub tick_interval: Duration,
    pub cross_influence: f64,
    pub identity_pull: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_users: DEFAULT_MAX_USERS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            cross_influence: CROSS_INFLUENCE,
            identity_pull: IDENTITY_PULL,
        }
    }
}

/// Read-only view for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
    pub total_sessions: usize,
    pub lobby_count: usize,
    pub max_users: usize,
    pub world: WorldState,
    pub operator: OperatorState,
}

/// Session hub and simulation state.
#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    sessions: SessionRegistry,
    world: WorldState,
    operator: OperatorController,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(config.max_users),
            world: WorldState::default(),
            operator: OperatorController::new(),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn operator_state(&self) -> OperatorState {
        self.operator.state()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn status(&self) -> HubStatus {
        HubStatus {
            total_sessions: self.sessions.len(),
            lobby_count: self.sessions.lobby_count(),
            max_users: self.sessions.capacity(),
            world: self.world,
            operator: self.operator.state(),
        }
    }

    /// Admit a new connection: welcome it, then tell everyone the headcount.
    pub fn connect(&mut self, outbox: Outbox) -> Result<SessionId, CapacityExceeded> {
        let id = self.sessions.connect(outbox, now_millis())?;
        if let Some(session) = self.sessions.get(id) {
            session.send(ServerMessage::Welcome(Welcome {
                session_id: id,
                world: self.world,
                neutral_dna: Signature::NEUTRAL,
                questions: QUESTIONS,
            }));
        }
        info!(session = %id, total = self.sessions.len(), "Session connected");
        self.broadcast_presence();
        Ok(id)
    }

    /// Drop a session immediately. Returns false if it was already gone.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        if self.sessions.remove(id).is_none() {
            return false;
        }
        info!(session = %id, total = self.sessions.len(), "Session disconnected");
        self.broadcast_presence();
        true
    }

    /// Parse and apply one text frame. Malformed or unknown frames are dropped.
    pub fn handle_text(&mut self, id: SessionId, text: &str) {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle(id, message),
            Err(e) => debug!(session = %id, "Dropped message: {}", e),
        }
    }

    /// Apply a validated message from `id`.
    pub fn handle(&mut self, id: SessionId, message: ClientMessage) {
        if self.sessions.get(id).is_none() {
            debug!(session = %id, "Message for unknown session");
            return;
        }
        match message {
            ClientMessage::SubmitIdentity(identity) => self.submit_identity(id, identity),
            ClientMessage::UpdateIntent(intent) => self.update_intent(id, intent),
            ClientMessage::Operator(OperatorAction::Pause) => {
                self.toggle_pause();
            }
            ClientMessage::Operator(OperatorAction::Reset) => self.reset(),
            ClientMessage::Ping => {
                if let Some(session) = self.sessions.get(id) {
                    session.send(ServerMessage::Pong { ts: now_millis() });
                }
            }
        }
    }

    fn submit_identity(&mut self, id: SessionId, identity: Identity) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let dna = session.submit_identity(identity);
        session.send(ServerMessage::IdentityConfirmed { dna });
        info!(session = %id, lobby = self.sessions.lobby_count(), "Identity submitted");
        self.broadcast_presence();
    }

    fn update_intent(&mut self, id: SessionId, intent: Intent) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.update_intent(intent);
            debug!(session = %id, ai = intent.ai, artist = intent.artist, user = intent.user, "Intent updated");
        }
    }

    /// Flip the pause flag and announce it to everyone.
    pub fn toggle_pause(&mut self) -> OperatorState {
        let state = self.operator.toggle_pause();
        info!(paused = state.paused, "Operator toggled pause");
        self.sessions.broadcast(&ServerMessage::OperatorState(state));
        state
    }

    /// Reset every session to the welcome stage and announce it.
    pub fn reset(&mut self) {
        let count = self.operator.reset(&mut self.sessions);
        info!(sessions = count, "Operator reset");
        self.sessions.broadcast(&ServerMessage::Reset {});
    }

    /// One simulation step: blend the lobby, aggregate the world, fan out.
    ///
    /// Does nothing at all while paused.
    pub fn step(&mut self) {
        if self.operator.is_paused() {
            return;
        }
        self.world.tick += 1;

        let lobby: Vec<Signature> = self.sessions.lobby().map(|s| s.signature).collect();
        if lobby.len() > 1 {
            // Snapshot the average before anyone moves.
            if let Some(avg) = average(&lobby) {
                let (cross, pull) = (self.config.cross_influence, self.config.identity_pull);
                for session in self.sessions.lobby_mut() {
                    session.blend(&avg, cross, pull);
                }
            }
        }

        self.world
            .aggregate(self.sessions.lobby().map(|s| (s.intent, &s.signature)));
        self.broadcast_tick();
    }

    /// Send each lobby member the world, its own signature and everyone
    /// else's redacted view.
    fn broadcast_tick(&self) {
        let peers: Vec<PeerView> = self.sessions.lobby().map(|s| s.peer_view()).collect();
        for session in self.sessions.lobby() {
            let others = peers.iter().filter(|p| p.id != session.id).cloned().collect();
            session.send(ServerMessage::Tick(TickFrame {
                world: self.world,
                my_dna: session.signature,
                others,
            }));
        }
    }

    fn broadcast_presence(&self) {
        let presence = Presence {
            lobby_count: self.sessions.lobby_count(),
            total: self.sessions.len(),
        };
        self.sessions.broadcast(&ServerMessage::Presence(presence));
    }

    /// Drop every session. Their outboxes close, which closes the sockets.
    pub fn close_all(&mut self) -> usize {
        self.sessions.clear()
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Stage;
    use blobfield_dna::generate;
    use crate::session::{outbox, OUTBOX_CAPACITY};
    use tokio::sync::mpsc::{self, Receiver};

    type Inbox = Receiver<ServerMessage>;

    fn hub() -> Hub {
        Hub::new(HubConfig::default())
    }

    fn join(hub: &mut Hub) -> (SessionId, Inbox) {
        let (tx, rx) = outbox();
        let id = hub.connect(tx).unwrap();
        (id, rx)
    }

    fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = inbox.try_recv() {
            out.push(msg);
        }
        out
    }

    fn kinds(messages: &[ServerMessage]) -> Vec<&'static str> {
        messages.iter().map(ServerMessage::kind).collect()
    }

    fn identity(word: &str) -> ClientMessage {
        ClientMessage::SubmitIdentity(Identity::new(vec![word.to_string()], 7, Intent::default()))
    }

    fn signature(hub: &Hub, id: SessionId) -> Signature {
        hub.sessions().get(id).unwrap().signature
    }

    #[test]
    fn connect_sends_welcome_then_presence() {
        let mut hub = hub();
        let (id, mut inbox) = join(&mut hub);
        let messages = drain(&mut inbox);
        assert_eq!(kinds(&messages), ["welcome", "presence"]);

        match &messages[0] {
            ServerMessage::Welcome(w) => {
                assert_eq!(w.session_id, id);
                assert_eq!(w.neutral_dna, Signature::NEUTRAL);
                assert_eq!(w.questions.len(), QUESTIONS.len());
            }
            other => panic!("expected welcome, got {other:?}"),
        }
        match &messages[1] {
            ServerMessage::Presence(p) => assert_eq!(*p, Presence { lobby_count: 0, total: 1 }),
            other => panic!("expected presence, got {other:?}"),
        }
    }

    #[test]
    fn join_and_leave_broadcast_presence() {
        let mut hub = hub();
        let (_a, mut inbox_a) = join(&mut hub);
        let (b, _inbox_b) = join(&mut hub);
        drain(&mut inbox_a);

        hub.disconnect(b);
        let messages = drain(&mut inbox_a);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::Presence(Presence { lobby_count: 0, total: 1 })]
        ));
        assert!(!hub.disconnect(b));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut hub = Hub::new(HubConfig { max_users: 3, ..HubConfig::default() });
        let mut inboxes = Vec::new();
        for _ in 0..3 {
            inboxes.push(join(&mut hub).1);
        }
        let (tx, _rx) = outbox();
        assert_eq!(hub.connect(tx), Err(CapacityExceeded { capacity: 3 }));
        assert_eq!(hub.status().total_sessions, 3);
    }

    #[test]
    fn identity_submission_confirms_and_enters_lobby() {
        let mut hub = hub();
        let (id, mut inbox) = join(&mut hub);
        let (_other, mut other_inbox) = join(&mut hub);
        drain(&mut inbox);
        drain(&mut other_inbox);

        hub.handle(id, identity("lantern"));

        let messages = drain(&mut inbox);
        assert_eq!(kinds(&messages), ["identity_confirmed", "presence"]);
        let expected = generate(&Identity::new(vec!["lantern".into()], 7, Intent::default()));
        assert!(matches!(&messages[0], ServerMessage::IdentityConfirmed { dna } if *dna == expected));

        // Everyone hears the new lobby count
        assert!(matches!(
            drain(&mut other_inbox).as_slice(),
            [ServerMessage::Presence(Presence { lobby_count: 1, total: 2 })]
        ));

        let session = hub.sessions().get(id).unwrap();
        assert_eq!(session.stage, Stage::Lobby);
        assert_eq!(session.signature, expected);
        assert_eq!(session.target_signature, expected);
    }

    #[test]
    fn malformed_and_unknown_messages_are_dropped() {
        let mut hub = hub();
        let (id, mut inbox) = join(&mut hub);
        drain(&mut inbox);

        hub.handle_text(id, "{{{");
        hub.handle_text(id, r#"{"type":"launch","payload":{}}"#);
        hub.handle_text(id, r#"{"type":"submit_identity","payload":{"answers":"nope"}}"#);

        assert!(drain(&mut inbox).is_empty());
        assert_eq!(hub.sessions().get(id).unwrap().stage, Stage::Welcome);
    }

    #[test]
    fn null_identity_fields_still_reach_lobby() {
        let mut hub = hub();
        let (a, _inbox_a) = join(&mut hub);
        let (b, _inbox_b) = join(&mut hub);

        hub.handle_text(
            a,
            r#"{"type":"submit_identity","payload":{"answers":["water"],"imageHash":null,"intent":null}}"#,
        );
        hub.handle_text(
            b,
            r#"{"type":"submit_identity","payload":{"answers":null,"imageHash":3}}"#,
        );

        assert_eq!(hub.sessions().get(a).unwrap().stage, Stage::Lobby);
        assert_eq!(hub.sessions().get(b).unwrap().stage, Stage::Lobby);
        assert_eq!(
            signature(&hub, a),
            generate(&Identity::new(vec!["water".into()], 0, Intent::default()))
        );
    }

    #[test]
    fn ping_replies_to_sender_only() {
        let mut hub = hub();
        let (a, mut inbox_a) = join(&mut hub);
        let (_b, mut inbox_b) = join(&mut hub);
        drain(&mut inbox_a);
        drain(&mut inbox_b);

        hub.handle_text(a, r#"{"type":"ping","payload":{}}"#);

        assert!(matches!(drain(&mut inbox_a).as_slice(), [ServerMessage::Pong { ts }] if *ts > 0));
        assert!(drain(&mut inbox_b).is_empty());
    }

    #[test]
    fn update_intent_never_changes_stage() {
        let mut hub = hub();
        let (id, _inbox) = join(&mut hub);
        hub.handle(id, ClientMessage::UpdateIntent(Intent::clamped(100, 0, 0)));

        let session = hub.sessions().get(id).unwrap();
        assert_eq!(session.stage, Stage::Welcome);
        assert_eq!(session.intent, Intent::clamped(100, 0, 0));
        assert_eq!(session.signature, Signature::NEUTRAL);
        assert_eq!(hub.sessions().lobby_count(), 0);
    }

    #[test]
    fn submit_from_any_stage_enters_lobby() {
        let mut hub = hub();
        let (id, _inbox) = join(&mut hub);
        hub.handle(id, identity("first"));
        hub.reset();
        assert_eq!(hub.sessions().get(id).unwrap().stage, Stage::Welcome);

        hub.handle(id, identity("second"));
        assert_eq!(hub.sessions().get(id).unwrap().stage, Stage::Lobby);

        // Re-submission overwrites
        hub.handle(id, identity("third"));
        let expected = generate(&Identity::new(vec!["third".into()], 7, Intent::default()));
        assert_eq!(signature(&hub, id), expected);
    }

    #[test]
    fn step_advances_tick_and_sends_to_lobby_only() {
        let mut hub = hub();
        let (lobby, mut lobby_inbox) = join(&mut hub);
        let (_waiting, mut waiting_inbox) = join(&mut hub);
        hub.handle(lobby, identity("lantern"));
        drain(&mut lobby_inbox);
        drain(&mut waiting_inbox);

        hub.step();

        assert_eq!(hub.world().tick, 1);
        assert_eq!(hub.world().lobby_count, 1);
        let messages = drain(&mut lobby_inbox);
        match messages.as_slice() {
            [ServerMessage::Tick(frame)] => {
                assert_eq!(frame.world.tick, 1);
                assert_eq!(frame.my_dna, signature(&hub, lobby));
                assert!(frame.others.is_empty());
            }
            other => panic!("expected one tick, got {other:?}"),
        }
        assert!(drain(&mut waiting_inbox).is_empty());
    }

    #[test]
    fn single_member_is_not_blended() {
        let mut hub = hub();
        let (id, _inbox) = join(&mut hub);
        hub.handle(id, identity("lantern"));
        let before = signature(&hub, id);
        for _ in 0..10 {
            hub.step();
        }
        assert_eq!(signature(&hub, id), before);
    }

    #[test]
    fn tick_others_are_redacted_peers() {
        let mut hub = hub();
        let (a, mut inbox_a) = join(&mut hub);
        let (b, _inbox_b) = join(&mut hub);
        let (c, _inbox_c) = join(&mut hub);
        for (id, word) in [(a, "moss"), (b, "salt"), (c, "ember")] {
            hub.handle(id, identity(word));
        }
        drain(&mut inbox_a);

        hub.step();

        let messages = drain(&mut inbox_a);
        let [ServerMessage::Tick(frame)] = messages.as_slice() else {
            panic!("expected one tick, got {messages:?}");
        };
        let ids: Vec<SessionId> = frame.others.iter().map(|p| p.id).collect();
        assert_eq!(ids, [b, c]);

        let json = serde_json::to_value(&messages[0]).unwrap();
        for peer in json["payload"]["others"].as_array().unwrap() {
            let obj = peer.as_object().unwrap();
            assert_eq!(obj.len(), 5);
            for forbidden in ["intent", "phases", "freqs", "amps", "transparency", "iridescenceBase", "identity"] {
                assert!(!obj.contains_key(forbidden), "peer leaked {forbidden}");
            }
        }
    }

    #[test]
    fn pause_freezes_step_but_not_messages() {
        let mut hub = hub();
        let (a, mut inbox_a) = join(&mut hub);
        let (b, _inbox_b) = join(&mut hub);
        hub.handle(a, identity("moss"));
        hub.handle(b, identity("salt"));
        hub.step();
        drain(&mut inbox_a);

        let state = hub.toggle_pause();
        assert!(state.paused);
        assert!(matches!(
            drain(&mut inbox_a).as_slice(),
            [ServerMessage::OperatorState(OperatorState { paused: true, .. })]
        ));

        let world = *hub.world();
        let sig_a = signature(&hub, a);
        for _ in 0..20 {
            hub.step();
        }
        assert_eq!(*hub.world(), world);
        assert_eq!(signature(&hub, a), sig_a);
        assert!(drain(&mut inbox_a).is_empty());

        // Identity and intent still go through while paused
        let (c, _inbox_c) = join(&mut hub);
        hub.handle(c, identity("ember"));
        assert_eq!(hub.sessions().get(c).unwrap().stage, Stage::Lobby);
        hub.handle(a, ClientMessage::UpdateIntent(Intent::clamped(0, 0, 100)));
        assert_ne!(hub.sessions().get(a).unwrap().target_signature, sig_a);

        hub.toggle_pause();
        hub.step();
        assert_eq!(hub.world().tick, world.tick + 1);
    }

    #[test]
    fn reset_returns_everyone_to_welcome() {
        let mut hub = hub();
        let (a, mut inbox_a) = join(&mut hub);
        let (b, mut inbox_b) = join(&mut hub);
        hub.handle(a, identity("moss"));
        drain(&mut inbox_a);
        drain(&mut inbox_b);

        hub.handle(b, ClientMessage::Operator(OperatorAction::Reset));

        for id in [a, b] {
            let s = hub.sessions().get(id).unwrap();
            assert_eq!(s.stage, Stage::Welcome);
            assert!(s.identity.is_none());
            assert_eq!(s.signature, Signature::NEUTRAL);
            assert_eq!(s.target_signature, Signature::NEUTRAL);
        }
        assert_eq!(kinds(&drain(&mut inbox_a)), ["reset"]);
        assert_eq!(kinds(&drain(&mut inbox_b)), ["reset"]);

        // Nobody is in the lobby, so ticks go nowhere
        hub.step();
        assert_eq!(hub.world().lobby_count, 0);
        assert!(drain(&mut inbox_a).is_empty());
    }

    #[test]
    fn two_visitors_converge_slowly() {
        let mut hub = hub();
        let (a, _inbox_a) = join(&mut hub);
        let (b, _inbox_b) = join(&mut hub);
        hub.handle(a, identity("glacier"));
        hub.handle(b, identity("volcano"));

        let start_a = signature(&hub, a);
        let start_b = signature(&hub, b);
        let start_avg = average(&[start_a, start_b]).unwrap();
        let initial_gap = start_a.distance(&start_avg);

        for _ in 0..50 {
            hub.step();
        }

        let end_a = signature(&hub, a);
        let end_b = signature(&hub, b);
        let end_avg = average(&[end_a, end_b]).unwrap();
        let target_a = hub.sessions().get(a).unwrap().target_signature;
        let target_b = hub.sessions().get(b).unwrap().target_signature;

        assert!(end_a.distance(&end_avg) < initial_gap);
        assert!(end_b.distance(&end_avg) < start_b.distance(&start_avg));
        assert!(end_a.distance(&target_a) < end_a.distance(&end_avg));
        assert!(end_b.distance(&target_b) < end_b.distance(&end_avg));
        assert_eq!(hub.world().tick, 50);
    }

    #[test]
    fn world_reflects_lobby() {
        let mut hub = hub();
        let (a, _inbox_a) = join(&mut hub);
        let (b, _inbox_b) = join(&mut hub);
        hub.handle(
            a,
            ClientMessage::SubmitIdentity(Identity::new(vec!["x".into()], 0, Intent::clamped(100, 0, 0))),
        );
        hub.handle(
            b,
            ClientMessage::SubmitIdentity(Identity::new(vec!["y".into()], 0, Intent::clamped(0, 100, 0))),
        );
        hub.step();

        let world = hub.world();
        assert_eq!((world.ai, world.artist, world.user), (50, 50, 0));
        let glow = (signature(&hub, a).inner_glow + signature(&hub, b).inner_glow) / 2.0;
        assert!((world.energy - glow).abs() < 1e-12);
    }

    #[test]
    fn stalled_reader_queue_stays_bounded() {
        let mut hub = hub();
        let (stalled, mut stalled_inbox) = join(&mut hub);
        let (active, mut active_inbox) = join(&mut hub);
        hub.handle(stalled, identity("moss"));
        hub.handle(active, identity("salt"));
        drain(&mut active_inbox);

        // An hour of steps at 10 Hz
        for _ in 0..36_000 {
            hub.step();
            drain(&mut active_inbox);
        }

        assert!(stalled_inbox.len() <= OUTBOX_CAPACITY);
        // The stalled session is still connected and still blended
        assert!(hub.sessions().get(stalled).unwrap().in_lobby());
        assert_eq!(hub.world().tick, 36_000);
        assert_eq!(drain(&mut stalled_inbox).len(), OUTBOX_CAPACITY);
    }

    #[test]
    fn close_all_drops_outboxes() {
        let mut hub = hub();
        let (_a, mut inbox) = join(&mut hub);
        drain(&mut inbox);
        assert_eq!(hub.close_all(), 1);
        assert!(matches!(inbox.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }
}
