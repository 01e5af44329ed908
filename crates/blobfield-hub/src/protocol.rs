//! Wire protocol: `{type, payload}` JSON envelopes in both directions.
//!
//! Inbound payloads are validated against explicit per-type schemas before
//! dispatch. Anything that does not fit is rejected as a whole; the hub
//! drops it without replying.

use blobfield_dna::{Identity, Intent, Signature};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::operator::{OperatorAction, OperatorState};
use crate::session::SessionId;
use crate::world::WorldState;

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown message type {0:?}")]
    UnknownType(String),
}

/// A validated client → server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SubmitIdentity(Identity),
    UpdateIntent(Intent),
    Operator(OperatorAction),
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// `submit_identity` payload. Every field is optional, and `null` counts as
/// absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityPayload {
    #[serde(default)]
    answers: Option<Vec<String>>,
    #[serde(default)]
    image_hash: Option<i64>,
    #[serde(default)]
    intent: Option<IntentPayload>,
}

/// Intent percentages. Numbers are rounded and clamped to `[0, 100]`;
/// missing or non-numeric fields fall back to 33 / 33 / 34.
#[derive(Debug, Default, Deserialize)]
struct IntentPayload {
    #[serde(default)]
    ai: Option<Value>,
    #[serde(default)]
    artist: Option<Value>,
    #[serde(default)]
    user: Option<Value>,
}

impl IntentPayload {
    fn into_intent(self) -> Intent {
        let defaults = Intent::default();
        Intent::clamped(
            percent(self.ai, defaults.ai),
            percent(self.artist, defaults.artist),
            percent(self.user, defaults.user),
        )
    }
}

fn percent(value: Option<Value>, default: u8) -> i64 {
    value
        .as_ref()
        .and_then(Value::as_f64)
        .map(|n| n.round() as i64)
        .unwrap_or(i64::from(default))
}

#[derive(Deserialize)]
struct OperatorPayload {
    action: OperatorAction,
}

impl ClientMessage {
    /// Parse and validate one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let payload = match envelope.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        match envelope.kind.as_str() {
            "submit_identity" => {
                let p: IdentityPayload = serde_json::from_value(payload)?;
                let intent = p.intent.map(IntentPayload::into_intent).unwrap_or_default();
                Ok(Self::SubmitIdentity(Identity::new(
                    p.answers.unwrap_or_default(),
                    p.image_hash.unwrap_or_default(),
                    intent,
                )))
            }
            "update_intent" => {
                let p: IntentPayload = serde_json::from_value(payload)?;
                Ok(Self::UpdateIntent(p.into_intent()))
            }
            "operator" => {
                let p: OperatorPayload = serde_json::from_value(payload)?;
                Ok(Self::Operator(p.action))
            }
            "ping" => Ok(Self::Ping),
            _ => Err(ProtocolError::UnknownType(envelope.kind)),
        }
    }
}

/// One identity prompt shown on the welcome screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: &'static str,
    pub prompt: &'static str,
    pub options: &'static [&'static str],
}

/// The fixed identity prompts, in answer order.
pub const QUESTIONS: &[Question] = &[
    Question {
        id: "element",
        prompt: "Which element do you carry with you?",
        options: &["water", "fire", "earth", "air"],
    },
    Question {
        id: "hour",
        prompt: "What hour of the day feels most like you?",
        options: &["dawn", "noon", "dusk", "midnight"],
    },
    Question {
        id: "texture",
        prompt: "Pick a texture.",
        options: &["glass", "velvet", "stone", "smoke"],
    },
    Question {
        id: "motion",
        prompt: "How do you move through a crowd?",
        options: &["drift", "weave", "pause", "dash"],
    },
];

/// Payload of `welcome`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub session_id: SessionId,
    pub world: WorldState,
    #[serde(rename = "neutralDNA")]
    pub neutral_dna: Signature,
    pub questions: &'static [Question],
}

/// Payload of `presence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub lobby_count: usize,
    pub total: usize,
}

/// What one lobby member sees of another. Nothing about intent or identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    pub id: SessionId,
    pub color: [f64; 3],
    pub inner_glow: f64,
    pub glossiness: f64,
    #[serde(rename = "breathAmt")]
    pub breath_amount: f64,
}

/// Payload of `tick`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickFrame {
    pub world: WorldState,
    #[serde(rename = "myDNA")]
    pub my_dna: Signature,
    pub others: Vec<PeerView>,
}

/// A server → client message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome(Welcome),
    IdentityConfirmed { dna: Signature },
    Presence(Presence),
    OperatorState(OperatorState),
    Reset {},
    Pong { ts: u64 },
    Tick(TickFrame),
}

impl ServerMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome(_) => "welcome",
            ServerMessage::IdentityConfirmed { .. } => "identity_confirmed",
            ServerMessage::Presence(_) => "presence",
            ServerMessage::OperatorState(_) => "operator_state",
            ServerMessage::Reset {} => "reset",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Tick(_) => "tick",
        }
    }
}
