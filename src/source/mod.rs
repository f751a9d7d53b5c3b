//! Audio sources rendered on the capture side.
//!
//! When no external producer is attached, the capture fill falls back to the
//! [`ToneGenerator`], a deterministic sine synthesizer that stays
//! phase-continuous across fill requests of any size.

mod tone;

pub use tone::{MuteControl, MutePhasePolicy, ToneGenerator, ToneParams};
