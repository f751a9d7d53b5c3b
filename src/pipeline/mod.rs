//! Capture-side pipeline.
//!
//! The capture side pulls audio on its own schedule:
//!
//! ```text
//! Producer channel ─┐
//!                   ├─→ CaptureStream::fill → capture buffer
//! Tone generator  ──┘
//! ```
//!
//! - **Producer channel**: preferred whenever a producer holds the pin's channel open
//! - **Tone generator**: fallback while no producer is attached
//!
//! Scheduling of fills (timer period, buffer positions) belongs to the host
//! and is not part of this crate.

mod capture;

pub use capture::{CaptureStats, CaptureStream, FillSource};
