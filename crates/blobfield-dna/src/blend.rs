//! Field-wise signature blending.
//!
//! Only the appearance fields blend: `color`, the three wave tables,
//! `glossiness`, `transparency`, `iridescence_base` and `inner_glow`.
//! Breathing and rotation stay with the first operand.

use crate::signature::{Signature, WAVE_COUNT};

/// Field-wise arithmetic mean of a set of signatures.
///
/// Returns `None` for an empty set. Unblended fields of the result are
/// copied from the first signature.
pub fn average(signatures: &[Signature]) -> Option<Signature> {
    let (first, _) = signatures.split_first()?;
    let n = signatures.len() as f64;

    let mut sum = *first;
    sum.color = [0.0; 3];
    sum.freqs = [0.0; WAVE_COUNT];
    sum.amps = [0.0; WAVE_COUNT];
    sum.phases = [0.0; WAVE_COUNT];
    sum.glossiness = 0.0;
    sum.transparency = 0.0;
    sum.iridescence_base = 0.0;
    sum.inner_glow = 0.0;

    for sig in signatures {
        add_into(&mut sum.color, &sig.color);
        add_into(&mut sum.freqs, &sig.freqs);
        add_into(&mut sum.amps, &sig.amps);
        add_into(&mut sum.phases, &sig.phases);
        sum.glossiness += sig.glossiness;
        sum.transparency += sig.transparency;
        sum.iridescence_base += sig.iridescence_base;
        sum.inner_glow += sig.inner_glow;
    }

    sum.color.iter_mut().for_each(|v| *v /= n);
    sum.freqs.iter_mut().for_each(|v| *v /= n);
    sum.amps.iter_mut().for_each(|v| *v /= n);
    sum.phases.iter_mut().for_each(|v| *v /= n);
    sum.glossiness /= n;
    sum.transparency /= n;
    sum.iridescence_base /= n;
    sum.inner_glow /= n;

    Some(sum)
}

/// Interpolate `a` toward `b` by `t`: `a + (b - a) * t` on every blended field.
pub fn lerp(a: &Signature, b: &Signature, t: f64) -> Signature {
    let mut out = *a;
    lerp_into(&mut out.color, &b.color, t);
    lerp_into(&mut out.freqs, &b.freqs, t);
    lerp_into(&mut out.amps, &b.amps, t);
    lerp_into(&mut out.phases, &b.phases, t);
    out.glossiness = mix(a.glossiness, b.glossiness, t);
    out.transparency = mix(a.transparency, b.transparency, t);
    out.iridescence_base = mix(a.iridescence_base, b.iridescence_base, t);
    out.inner_glow = mix(a.inner_glow, b.inner_glow, t);
    out
}

fn add_into<const N: usize>(acc: &mut [f64; N], values: &[f64; N]) {
    for (a, v) in acc.iter_mut().zip(values) {
        *a += v;
    }
}

fn lerp_into<const N: usize>(from: &mut [f64; N], to: &[f64; N], t: f64) {
    for (a, b) in from.iter_mut().zip(to) {
        *a = mix(*a, *b, t);
    }
}

#[inline]
fn mix(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
