//! The visual signature value type.

/// Number of entries in each wave table (`freqs`, `amps`, `phases`).
pub const WAVE_COUNT: usize = 6;

/// Full numeric description of one visitor's blob.
///
/// Fields are not range-checked. Generation and blending keep them in
/// sensible ranges on their own, and nothing clamps them afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Signature {
    /// RGB, each component in `[0, 1]`
    pub color: [f64; 3],
    /// Surface wave frequencies
    pub freqs: [f64; WAVE_COUNT],
    /// Surface wave amplitudes
    pub amps: [f64; WAVE_COUNT],
    /// Surface wave phase offsets (radians)
    pub phases: [f64; WAVE_COUNT],
    pub glossiness: f64,
    pub transparency: f64,
    pub iridescence_base: f64,
    pub inner_glow: f64,
    /// Breathing cycles per second
    pub breath_frequency: f64,
    /// Breathing scale amplitude
    pub breath_amount: f64,
    pub rotation_rate_x: f64,
    pub rotation_rate_y: f64,
    pub rotation_rate_z: f64,
}

impl Signature {
    /// The unidentified "crystal" state every new or reset session starts in.
    pub const NEUTRAL: Self = Self {
        color: [0.86, 0.9, 0.96],
        freqs: [2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        amps: [0.02; WAVE_COUNT],
        phases: [0.0; WAVE_COUNT],
        glossiness: 0.9,
        transparency: 0.6,
        iridescence_base: 0.5,
        inner_glow: 0.2,
        breath_frequency: 0.25,
        breath_amount: 0.02,
        rotation_rate_x: 0.02,
        rotation_rate_y: 0.05,
        rotation_rate_z: 0.01,
    };

    /// Euclidean distance over the blended fields.
    ///
    /// Used to measure how far apart two visitors' blobs are; the
    /// rotation and breathing fields are not part of blending and are
    /// ignored here too.
    pub fn distance(&self, other: &Self) -> f64 {
        let mut sum = 0.0;
        for (a, b) in self.blended_fields().zip(other.blended_fields()) {
            sum += (a - b) * (a - b);
        }
        sum.sqrt()
    }

    /// Iterate the fields that take part in averaging and interpolation,
    /// in a fixed order.
    pub(crate) fn blended_fields(&self) -> impl Iterator<Item = f64> + '_ {
        self.color
            .iter()
            .chain(&self.freqs)
            .chain(&self.amps)
            .chain(&self.phases)
            .chain([
                &self.glossiness,
                &self.transparency,
                &self.iridescence_base,
                &self.inner_glow,
            ])
            .copied()
    }
}
