//! Identity → signature generation.
//!
//! The answers are folded into a 32-bit rolling hash seeded by the image
//! hash, the hash seeds a [`Mulberry32`] stream, and every signature field is
//! drawn from that stream in a fixed order. Intent weights bias the draws:
//!
//! - `ai` raises wave frequency and glossiness
//! - `artist` raises wave amplitude and iridescence
//! - `user` widens phase spread and raises inner glow
//!
//! The draw order below is part of the determinism contract. Reordering
//! draws changes every signature ever generated.

use std::f64::consts::TAU;

use crate::rng::Mulberry32;
use crate::signature::{Signature, WAVE_COUNT};

/// A visitor's intent mix, each component a percentage in `[0, 100]`.
///
/// Components are clamped independently and need not sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Intent {
    pub ai: u8,
    pub artist: u8,
    pub user: u8,
}

impl Intent {
    pub const MAX: u8 = 100;

    /// Build an intent, clamping each component to `[0, 100]`.
    pub fn clamped(ai: i64, artist: i64, user: i64) -> Self {
        Self {
            ai: clamp_percent(ai),
            artist: clamp_percent(artist),
            user: clamp_percent(user),
        }
    }

    /// Normalized weights `(ai, artist, user)` in `[0, 1]`.
    pub fn weights(&self) -> (f64, f64, f64) {
        (
            f64::from(self.ai) / 100.0,
            f64::from(self.artist) / 100.0,
            f64::from(self.user) / 100.0,
        )
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self { ai: 33, artist: 33, user: 34 }
    }
}

fn clamp_percent(v: i64) -> u8 {
    v.clamp(0, i64::from(Intent::MAX)) as u8
}

/// Everything a visitor submits about themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Identity {
    /// Prompt answers, in prompt order
    pub answers: Vec<String>,
    /// Hash of the visitor's chosen image
    pub image_hash: i64,
    pub intent: Intent,
}

impl Identity {
    pub fn new(answers: Vec<String>, image_hash: i64, intent: Intent) -> Self {
        Self { answers, image_hash, intent }
    }
}

/// Fold answers into the generator seed.
///
/// Answers are joined with single spaces and hashed one UTF-16 code unit at a
/// time with `seed = seed * 31 + unit` in 32-bit signed arithmetic, starting
/// from the image hash truncated to 32 bits. The seed is the absolute value
/// of the final hash.
pub fn identity_seed(answers: &[String], image_hash: i64) -> u32 {
    let joined = answers.join(" ");
    let mut seed = image_hash as i32;
    for unit in joined.encode_utf16() {
        seed = (seed << 5).wrapping_sub(seed).wrapping_add(i32::from(unit));
    }
    seed.unsigned_abs()
}

/// Derive a visitor's signature from their identity.
pub fn generate(identity: &Identity) -> Signature {
    let mut rng = Mulberry32::new(identity_seed(&identity.answers, identity.image_hash));
    let (ai, artist, user) = identity.intent.weights();

    let hue = rng.range(0.0, 360.0);
    let saturation = rng.range(0.45, 0.85) + artist * 0.1;
    let lightness = rng.range(0.42, 0.62);
    let color = hsl_to_rgb(hue, saturation.min(1.0), lightness);

    let mut freqs = [0.0; WAVE_COUNT];
    let mut amps = [0.0; WAVE_COUNT];
    let mut phases = [0.0; WAVE_COUNT];
    for i in 0..WAVE_COUNT {
        freqs[i] = rng.range(1.0, 4.0) + ai * 3.0 + i as f64 * 0.5;
        amps[i] = rng.range(0.04, 0.16) + artist * 0.14;
        phases[i] = rng.next_f64() * TAU * (0.4 + user * 0.6);
    }

    let glossiness = rng.range(0.2, 0.5) + ai * 0.45;
    let transparency = rng.range(0.05, 0.35);
    let iridescence_base = rng.range(0.1, 0.4) + artist * 0.5;
    let inner_glow = rng.range(0.15, 0.4) + user * 0.5;
    let breath_frequency = rng.range(0.15, 0.6);
    let breath_amount = rng.range(0.02, 0.08);
    let rotation_rate_x = rng.range(-0.2, 0.2);
    let rotation_rate_y = rng.range(-0.2, 0.2);
    let rotation_rate_z = rng.range(-0.2, 0.2);

    Signature {
        color,
        freqs,
        amps,
        phases,
        glossiness,
        transparency,
        iridescence_base,
        inner_glow,
        breath_frequency,
        breath_amount,
        rotation_rate_x,
        rotation_rate_y,
        rotation_rate_z,
    }
}

/// Convert HSL (hue in degrees, saturation and lightness in `[0, 1]`) to RGB.
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> [f64; 3] {
    let h = hue / 360.0;
    let (s, l) = (saturation, lightness);
    if s == 0.0 {
        return [l, l, l];
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
