//! Per-connection sessions and the registry that owns them.

use std::collections::BTreeMap;
use std::fmt;

use blobfield_dna::{generate, lerp, Identity, Intent, Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{PeerView, ServerMessage};

/// Default registry capacity.
pub const DEFAULT_MAX_USERS: usize = 50;

/// WebSocket close code sent when the registry is full (1013, "try again later").
pub const CAPACITY_CLOSE_CODE: u16 = 1013;

/// Frames queued per connection before further sends are dropped.
pub const OUTBOX_CAPACITY: usize = 256;

/// Outbound half of a connection, bounded by [`OUTBOX_CAPACITY`]. Sends never
/// block; a full or closed queue drops the message.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Create the queue for one connection.
pub fn outbox() -> (Outbox, mpsc::Receiver<ServerMessage>) {
    mpsc::channel(OUTBOX_CAPACITY)
}

/// Sequential identifier assigned at connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Where a session is in the visitor flow.
///
/// `Identity` is a front-end placeholder; the hub never sets it and treats
/// it like `Welcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Welcome,
    Identity,
    Lobby,
}

/// Connection refused because the registry is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("installation is full ({capacity} visitors)")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

impl CapacityExceeded {
    /// WebSocket close code for the refusal.
    pub fn close_code(&self) -> u16 {
        CAPACITY_CLOSE_CODE
    }

    /// Close reason for the refusal.
    pub fn reason(&self) -> &'static str {
        "installation is full"
    }
}

/// One live connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub stage: Stage,
    /// Present once the visitor has submitted an identity
    pub identity: Option<Identity>,
    pub intent: Intent,
    /// Live signature, blended every tick while in the lobby
    pub signature: Signature,
    /// Signature the live one is pulled back toward
    pub target_signature: Signature,
    /// Connect time, milliseconds since the Unix epoch
    pub joined_at: u64,
    outbox: Outbox,
}

impl Session {
    fn new(id: SessionId, outbox: Outbox, joined_at: u64) -> Self {
        Self {
            id,
            stage: Stage::Welcome,
            identity: None,
            intent: Intent::default(),
            signature: Signature::NEUTRAL,
            target_signature: Signature::NEUTRAL,
            joined_at,
            outbox,
        }
    }

    pub fn in_lobby(&self) -> bool {
        self.stage == Stage::Lobby
    }

    /// Queue a message for this connection. A slow reader loses frames
    /// instead of growing its queue.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbox.try_send(message).is_ok()
    }

    /// Record an identity and jump straight to the lobby.
    ///
    /// Both the live and target signature are replaced with the generated
    /// one. Re-submission overwrites.
    pub fn submit_identity(&mut self, identity: Identity) -> Signature {
        let dna = generate(&identity);
        self.intent = identity.intent;
        self.identity = Some(identity);
        self.signature = dna;
        self.target_signature = dna;
        self.stage = Stage::Lobby;
        dna
    }

    /// Store a new intent. With an identity present only the target
    /// signature is regenerated; stage and live signature are left alone.
    pub fn update_intent(&mut self, intent: Intent) {
        self.intent = intent;
        if let Some(identity) = self.identity.as_mut() {
            identity.intent = intent;
            self.target_signature = generate(identity);
        }
    }

    /// One tick of blending: bleed toward the field average, then pull back
    /// toward the visitor's own target.
    pub fn blend(&mut self, average: &Signature, cross_influence: f64, identity_pull: f64) {
        let drifted = lerp(&self.signature, average, cross_influence);
        self.signature = lerp(&drifted, &self.target_signature, identity_pull);
    }

    pub fn reset(&mut self) {
        self.stage = Stage::Welcome;
        self.identity = None;
        self.signature = Signature::NEUTRAL;
        self.target_signature = Signature::NEUTRAL;
    }

    /// The redacted view other lobby members receive.
    pub fn peer_view(&self) -> PeerView {
        PeerView {
            id: self.id,
            color: self.signature.color,
            inner_glow: self.signature.inner_glow,
            glossiness: self.signature.glossiness,
            breath_amount: self.signature.breath_amount,
        }
    }
}

/// Sessions keyed by id, with a hard capacity.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    capacity: usize,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            capacity,
            next_id: 1,
        }
    }

    /// Register a new connection, or refuse it outright when full.
    pub fn connect(&mut self, outbox: Outbox, joined_at: u64) -> Result<SessionId, CapacityExceeded> {
        if self.sessions.len() >= self.capacity {
            return Err(CapacityExceeded { capacity: self.capacity });
        }
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, Session::new(id, outbox, joined_at));
        Ok(id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn lobby(&self) -> impl Iterator<Item = &Session> {
        self.iter().filter(|s| s.in_lobby())
    }

    pub fn lobby_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.iter_mut().filter(|s| s.in_lobby())
    }

    pub fn lobby_count(&self) -> usize {
        self.lobby().count()
    }

    /// Send a message to every session. Returns how many sends succeeded.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        self.iter().filter(|s| s.send(message.clone())).count()
    }

    /// Drop every session, closing their outboxes.
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}
