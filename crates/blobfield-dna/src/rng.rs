//! Mulberry32 pseudo-random stream.
//!
//! Small 32-bit bit-mixing generator. The exact sequence is part of the
//! determinism contract: a given seed must draw the same values on every
//! platform and every run, so all arithmetic is explicit 32-bit wrapping.

/// Additive constant applied to the state before each draw.
const INCREMENT: u32 = 0x6D2B_79F5;

/// Divisor mapping a `u32` onto `[0, 1)`.
const TWO_POW_32: f64 = 4_294_967_296.0;

/// A deterministic generator of uniform values in `[0, 1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    /// Seed a new stream.
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Current internal state.
    pub const fn state(&self) -> u32 {
        self.state
    }

    /// Draw the next raw 32-bit output.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(INCREMENT);
        let s = self.state;
        let mut t = (s ^ (s >> 15)).wrapping_mul(s | 1);
        // No `t +` term before the xor; published streams depend on it.
        t = (t ^ (t >> 7)).wrapping_mul(t | 61) ^ t;
        t ^ (t >> 14)
    }

    /// Draw the next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / TWO_POW_32
    }

    /// Draw a value in `[lo, hi)`.
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }
}

impl Iterator for Mulberry32 {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_f64())
    }
}
