//! Shared world state: aggregate intent, energy and mood of the lobby.

use blobfield_dna::{Intent, Signature};
use serde::{Deserialize, Serialize};

/// Discrete mood of the installation, ordered from calmest to most excited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    #[default]
    Void,
    Still,
    Erode,
    Drift,
    Bloom,
    Pulse,
    Surge,
}

/// Energy thresholds, checked top to bottom. Each is exclusive: energy must
/// be strictly above a threshold to reach its band.
const MOOD_BANDS: [(f64, Mood); 6] = [
    (0.75, Mood::Surge),
    (0.60, Mood::Pulse),
    (0.45, Mood::Bloom),
    (0.35, Mood::Drift),
    (0.25, Mood::Erode),
    (0.15, Mood::Still),
];

impl Mood {
    /// Classify a mean inner-glow energy.
    pub fn classify(energy: f64) -> Self {
        MOOD_BANDS
            .iter()
            .find(|(threshold, _)| energy > *threshold)
            .map(|(_, mood)| *mood)
            .unwrap_or(Mood::Void)
    }
}

/// Process-wide world summary broadcast with every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    pub mood: Mood,
    /// Rounded mean `ai` intent of the lobby
    pub ai: u8,
    /// Rounded mean `artist` intent of the lobby
    pub artist: u8,
    /// Rounded mean `user` intent of the lobby
    pub user: u8,
    /// Mean inner glow
    pub energy: f64,
    /// Mean glossiness
    pub density: f64,
    pub lobby_count: usize,
    /// Simulation steps taken; frozen while paused
    pub tick: u64,
}

impl WorldState {
    /// Recompute the aggregates from the current lobby.
    ///
    /// An empty lobby only zeroes `lobby_count`; the last aggregates stay
    /// so the mood does not snap back to `VOID` between visitors.
    pub fn aggregate<'a, I>(&mut self, lobby: I)
    where
        I: IntoIterator<Item = (Intent, &'a Signature)>,
    {
        let mut count = 0usize;
        let (mut ai, mut artist, mut user) = (0.0, 0.0, 0.0);
        let (mut glow, mut gloss) = (0.0, 0.0);

        for (intent, signature) in lobby {
            count += 1;
            ai += f64::from(intent.ai);
            artist += f64::from(intent.artist);
            user += f64::from(intent.user);
            glow += signature.inner_glow;
            gloss += signature.glossiness;
        }

        self.lobby_count = count;
        if count == 0 {
            return;
        }

        let n = count as f64;
        self.ai = (ai / n).round() as u8;
        self.artist = (artist / n).round() as u8;
        self.user = (user / n).round() as u8;
        self.energy = glow / n;
        self.density = gloss / n;
        self.mood = Mood::classify(self.energy);
    }
}
