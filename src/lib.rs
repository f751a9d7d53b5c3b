//! # virtual-mic
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Streaming core of a virtual capture device.
//!
//! `virtual-mic` produces the audio a virtual microphone delivers to its capture
//! host. It synthesizes a phase-continuous sine tone on demand, accepts real PCM
//! from an external producer through a named channel, and answers control
//! queries about the device's configuration and state.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use virtual_mic::{
//!     pipe_name, AudioFormat, CaptureStream, ChannelConfig, ChannelRegistry, DeviceState,
//!     FillSource, ToneParams, Topology,
//! };
//!
//! let registry = ChannelRegistry::new();
//! let mut capture = CaptureStream::new(
//!     registry.clone(),
//!     &Topology::default(),
//!     0,
//!     AudioFormat::PIPE_DEFAULT,
//!     ToneParams::sine(440.0, 16000.0),
//!     Arc::new(DeviceState::new()),
//! )?;
//! capture.start();
//!
//! // With no producer attached the capture host hears the tone
//! let mut period = vec![0u8; 1764];
//! assert_eq!(capture.fill(&mut period), FillSource::Tone);
//!
//! // A producer on pin 0 takes over
//! let writer = registry.create(pipe_name(0), ChannelConfig::default())?;
//! writer.write(&[0u8; 1764])?;
//! assert!(matches!(capture.fill(&mut period), FillSource::Producer { .. }));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **Tone generator**: renders any number of bytes, carrying split frames
//!   over to the next call so the stream stays sample-continuous
//! - **Channel**: bounded single-producer single-consumer byte pipe, one per
//!   input pin, owned by the producer
//! - **Capture stream**: serves each fill from the channel when a producer is
//!   attached and from the tone otherwise
//! - **Control service**: fixed-size info and status records behind raw
//!   control codes

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod channel;
mod config;
pub mod control;
mod error;
mod event;
pub mod format;
mod pipeline;
mod producer;
pub mod source;
pub mod topology;

pub use channel::{
    pipe_name, ChannelName, ChannelReader, ChannelRegistry, ChannelStats, ChannelWriter,
    FillOutcome, PIPE_NAME_PREFIX,
};
pub use config::{BlockingMode, ChannelConfig};
pub use control::{
    ControlCode, ControlHandle, ControlInfo, ControlService, ControlStatus, DeviceState,
    DRIVER_VERSION,
};
pub use error::{ChannelError, ControlError, ProducerError, VirtualMicError};
pub use event::{event_callback, BridgeEvent, EventCallback};
pub use format::{AudioFormat, SampleWidth};
pub use pipeline::{CaptureStats, CaptureStream, FillSource};
pub use producer::{
    PipeProducer, ProducerInput, ProducerStats, Segment, TestPattern, DEFAULT_NOISE_SEED,
    PATTERN_AMPLITUDE, SWEEP_FREQUENCIES,
};
pub use source::{MuteControl, MutePhasePolicy, ToneGenerator, ToneParams};
pub use topology::{EndpointDescriptor, EndpointKind, Topology};
