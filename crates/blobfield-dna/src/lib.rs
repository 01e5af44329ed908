//! Blobfield DNA
//!
//! Deterministic visual signatures ("DNA") for installation visitors.
//!
//! # Pipeline
//!
//! - **Identity**: a visitor's answers, an image hash and an intent mix
//! - **Generator**: folds the identity into a 32-bit seed and draws every
//!   signature field from a [`Mulberry32`] stream
//! - **Blender**: field-wise averaging and interpolation, used by the hub to
//!   pull co-present visitors toward one another
//!
//! Everything in this crate is pure: the same identity always yields a
//! bit-identical [`Signature`].
//!
//! # Usage
//!
//! ```
//! use blobfield_dna::{generate, Identity, Intent};
//!
//! let identity = Identity::new(vec!["ocean".into(), "night".into()], 42, Intent::default());
//! let dna = generate(&identity);
//! assert_eq!(dna, generate(&identity));
//! ```

mod blend;
mod generator;
mod rng;
mod signature;

pub use blend::{average, lerp};
pub use generator::{generate, hsl_to_rgb, identity_seed, Identity, Intent};
pub use rng::Mulberry32;
pub use signature::{Signature, WAVE_COUNT};
