//! Capture fill - serves each fill request from the producer channel or the tone.
//!
//! The capture side owns its timing: it calls [`CaptureStream::fill`] whenever
//! it needs the next block of audio. Each call:
//! - Attaches to the pin's producer channel if one has appeared
//! - Copies whole frames from the channel and pads any shortfall with silence
//! - Falls back to the tone generator when no producer is attached
//! - Tracks underruns and emits events when they start and end

use std::sync::Arc;

use crate::channel::{pipe_name, ChannelName, ChannelReader, ChannelRegistry, FillOutcome};
use crate::control::DeviceState;
use crate::event::EventCallback;
use crate::source::{MuteControl, ToneGenerator, ToneParams};
use crate::topology::Topology;
use crate::{AudioFormat, BridgeEvent, VirtualMicError};

/// Where the bytes of one fill came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSource {
    /// The producer channel, padded with silence if it ran short.
    Producer {
        /// Bytes copied from the channel.
        delivered: usize,
        /// Bytes padded with silence.
        silence: usize,
    },
    /// The tone generator; no producer is attached.
    Tone,
}

/// Counters for a capture stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Fill requests served.
    pub fills: u64,
    /// Bytes taken from the producer channel.
    pub producer_bytes: u64,
    /// Silence bytes padded during underruns.
    pub silence_bytes: u64,
    /// Bytes rendered by the tone generator.
    pub tone_bytes: u64,
}

/// Detects when the producer stops keeping up and when it recovers.
#[derive(Debug, Default)]
struct UnderrunMonitor {
    starved: bool,
    padded: u64,
}

impl UnderrunMonitor {
    /// Updates state from one fill and returns an event if the state changed.
    fn update(&mut self, channel: &ChannelName, outcome: FillOutcome) -> Option<BridgeEvent> {
        if outcome.silence > 0 {
            self.padded += outcome.silence as u64;
            if !self.starved {
                self.starved = true;
                return Some(BridgeEvent::UnderrunStarted {
                    channel: channel.clone(),
                    missing_bytes: outcome.silence,
                });
            }
        } else if self.starved {
            self.starved = false;
            let padded_bytes = std::mem::take(&mut self.padded);
            return Some(BridgeEvent::UnderrunEnded {
                channel: channel.clone(),
                padded_bytes,
            });
        }
        None
    }

    fn reset(&mut self) {
        self.starved = false;
        self.padded = 0;
    }
}

/// Capture-side fill bridge for one input pin.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use virtual_mic::{
///     AudioFormat, CaptureStream, ChannelRegistry, DeviceState, FillSource, ToneParams, Topology,
/// };
///
/// let registry = ChannelRegistry::new();
/// let state = Arc::new(DeviceState::new());
/// let mut capture = CaptureStream::new(
///     registry,
///     &Topology::default(),
///     0,
///     AudioFormat::PIPE_DEFAULT,
///     ToneParams::default(),
///     state,
/// )?;
/// capture.start();
///
/// let mut period = vec![0u8; 1764];
/// assert_eq!(capture.fill(&mut period), FillSource::Tone);
/// # Ok::<(), virtual_mic::VirtualMicError>(())
/// ```
pub struct CaptureStream {
    pin: u32,
    channel: ChannelName,
    format: AudioFormat,
    registry: ChannelRegistry,
    reader: Option<ChannelReader>,
    tone: ToneGenerator,
    state: Arc<DeviceState>,
    event_callback: Option<EventCallback>,
    underrun: UnderrunMonitor,
    running: bool,
    stats: CaptureStats,
}

impl CaptureStream {
    /// Creates the fill bridge for `pin` after negotiating `format` with the topology.
    ///
    /// # Errors
    ///
    /// - [`VirtualMicError::UnknownPin`] if the topology has no such capture pin
    /// - [`VirtualMicError::InvalidFormat`] if the pin does not accept `format`
    /// - [`VirtualMicError::InvalidTone`] if the fallback tone parameters are rejected
    pub fn new(
        registry: ChannelRegistry,
        topology: &Topology,
        pin: u32,
        format: AudioFormat,
        tone: ToneParams,
        state: Arc<DeviceState>,
    ) -> Result<Self, VirtualMicError> {
        let format = topology.negotiate(pin, format)?;
        let tone = ToneGenerator::new(tone, format)?;
        let channel = pipe_name(pin);

        tracing::info!(pin, %channel, %format, "capture stream created");

        Ok(Self {
            pin,
            channel,
            format,
            registry,
            reader: None,
            tone,
            state,
            event_callback: None,
            underrun: UnderrunMonitor::default(),
            running: false,
            stats: CaptureStats::default(),
        })
    }

    /// Registers a callback for [`BridgeEvent`]s.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Marks the stream as running in the published device state.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.state.set_sample_rate(self.format.sample_rate);
        self.state.set_mic_active(true);
        tracing::info!(pin = self.pin, "capture stream started");
    }

    /// Marks the stream as stopped and releases the producer channel.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.reader = None;
        self.underrun.reset();
        self.state.set_mic_active(false);
        self.state.set_sample_rate(0);
        tracing::info!(pin = self.pin, stats = ?self.stats, "capture stream stopped");
    }

    /// Fills all of `buf` with the next block of captured audio.
    pub fn fill(&mut self, buf: &mut [u8]) -> FillSource {
        self.stats.fills += 1;
        if self.reader.is_none() {
            self.try_attach();
        }

        let frame_size = self.format.frame_size();
        let silence = self.format.silence_byte();
        let result = self
            .reader
            .as_mut()
            .map(|reader| reader.fill(buf, frame_size, silence));

        match result {
            Some(Ok(outcome)) => {
                self.stats.producer_bytes += outcome.delivered as u64;
                self.stats.silence_bytes += outcome.silence as u64;
                if let Some(event) = self.underrun.update(&self.channel, outcome) {
                    tracing::warn!(?event, "underrun state changed");
                    self.emit(event);
                }
                return FillSource::Producer {
                    delivered: outcome.delivered,
                    silence: outcome.silence,
                };
            }
            Some(Err(err)) => {
                // Closing wakes a producer blocked on a channel it can never drain
                if let Some(mut reader) = self.reader.take() {
                    reader.close();
                }
                self.underrun.reset();
                tracing::warn!(channel = %self.channel, %err, "producer detached, falling back to tone");
                self.emit(BridgeEvent::ProducerDetached {
                    channel: self.channel.clone(),
                    reason: err.to_string(),
                });
            }
            None => {}
        }

        self.tone.generate_sine(buf);
        self.stats.tone_bytes += buf.len() as u64;
        FillSource::Tone
    }

    /// Mute flag of the fallback tone.
    pub fn mute_control(&self) -> MuteControl {
        self.tone.mute_control()
    }

    /// Returns `true` while a producer channel is attached.
    pub fn is_producer_attached(&self) -> bool {
        self.reader.is_some()
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The negotiated format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Name of the producer channel this pin reads.
    pub fn channel_name(&self) -> &ChannelName {
        &self.channel
    }

    /// Counters since creation.
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    fn try_attach(&mut self) {
        match self.registry.open(self.channel.clone()) {
            Ok(reader) => {
                tracing::info!(channel = %self.channel, "producer attached");
                self.reader = Some(reader);
                self.emit(BridgeEvent::ProducerAttached {
                    channel: self.channel.clone(),
                });
            }
            Err(err) => {
                tracing::trace!(channel = %self.channel, %err, "no producer to attach");
            }
        }
    }

    fn emit(&self, event: BridgeEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("pin", &self.pin)
            .field("format", &self.format)
            .field("attached", &self.reader.is_some())
            .field("running", &self.running)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use parking_lot::Mutex;

    fn capture(registry: &ChannelRegistry, state: &Arc<DeviceState>) -> CaptureStream {
        CaptureStream::new(
            registry.clone(),
            &Topology::default(),
            0,
            AudioFormat::PIPE_DEFAULT,
            ToneParams::sine(440.0, 16000.0),
            Arc::clone(state),
        )
        .unwrap()
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<BridgeEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (
            crate::event_callback(move |e| sink.lock().push(e)),
            events,
        )
    }

    #[test]
    fn test_tone_without_producer() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let mut stream = capture(&registry, &state);

        let mut buf = [0u8; 400];
        assert_eq!(stream.fill(&mut buf), FillSource::Tone);
        assert!(buf.iter().any(|&b| b != 0));
        assert_eq!(stream.stats().tone_bytes, 400);
    }

    #[test]
    fn test_start_stop_publishes_state() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let mut stream = capture(&registry, &state);

        stream.start();
        let status = state.snapshot();
        assert!(status.mic_active());
        assert_eq!(status.sample_rate, 44100);

        stream.stop();
        assert!(!state.snapshot().mic_active());
        assert_eq!(state.snapshot().sample_rate, 0);
    }

    #[test]
    fn test_drop_clears_state() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let mut stream = capture(&registry, &state);
        stream.start();
        drop(stream);
        assert!(!state.snapshot().mic_active());
    }

    #[test]
    fn test_producer_audio_and_underrun_events() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let (callback, events) = recorder();
        let mut stream = capture(&registry, &state).with_event_callback(callback);

        let writer = registry
            .create(pipe_name(0), ChannelConfig::default())
            .unwrap();
        // One and a half frames: only the whole frame may be consumed
        writer.write(&[1, 2, 3, 4, 5, 6]).unwrap();

        let mut buf = [0xFFu8; 8];
        assert_eq!(
            stream.fill(&mut buf),
            FillSource::Producer {
                delivered: 4,
                silence: 4
            }
        );
        assert_eq!(buf, [1, 2, 3, 4, 0, 0, 0, 0]);
        assert!(stream.is_producer_attached());

        writer.write(&[7, 8, 9, 10, 11, 12]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(
            stream.fill(&mut buf),
            FillSource::Producer {
                delivered: 8,
                silence: 0
            }
        );
        assert_eq!(buf, [5, 6, 7, 8, 9, 10, 11, 12]);

        let events = events.lock();
        assert_eq!(
            *events,
            vec![
                BridgeEvent::ProducerAttached {
                    channel: pipe_name(0)
                },
                BridgeEvent::UnderrunStarted {
                    channel: pipe_name(0),
                    missing_bytes: 4
                },
                BridgeEvent::UnderrunEnded {
                    channel: pipe_name(0),
                    padded_bytes: 4
                },
            ]
        );
    }

    #[test]
    fn test_falls_back_to_tone_when_producer_leaves() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let (callback, events) = recorder();
        let mut stream = capture(&registry, &state).with_event_callback(callback);

        let writer = registry
            .create(pipe_name(0), ChannelConfig::default())
            .unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(stream.fill(&mut buf), FillSource::Producer { .. }));

        drop(writer);
        assert_eq!(stream.fill(&mut buf), FillSource::Tone);
        assert!(!stream.is_producer_attached());
        assert!(matches!(
            events.lock().last(),
            Some(BridgeEvent::ProducerDetached { .. })
        ));

        // A new producer on the same pin is picked up again
        let _writer = registry
            .create(pipe_name(0), ChannelConfig::default())
            .unwrap();
        assert!(matches!(stream.fill(&mut buf), FillSource::Producer { .. }));
    }

    #[test]
    fn test_channel_smaller_than_frame_is_closed() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let (callback, events) = recorder();
        let mut stream = capture(&registry, &state).with_event_callback(callback);

        let config = ChannelConfig {
            capacity_bytes: 3,
            ..ChannelConfig::default()
        };
        let writer = registry.create(pipe_name(0), config).unwrap();
        writer.write(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(stream.fill(&mut buf), FillSource::Tone);
        assert!(!stream.is_producer_attached());
        assert!(writer.is_closed());
        assert_eq!(writer.write(&[4]), Err(crate::ChannelError::ChannelClosed));

        // The closed channel is not picked up again
        assert_eq!(stream.fill(&mut buf), FillSource::Tone);
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], BridgeEvent::ProducerDetached { .. }));
    }

    #[test]
    fn test_mute_control_reaches_tone() {
        let registry = ChannelRegistry::new();
        let state = Arc::new(DeviceState::new());
        let mut stream = capture(&registry, &state);
        stream.mute_control().set(true);

        let mut buf = [0xAAu8; 64];
        stream.fill(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let err = CaptureStream::new(
            ChannelRegistry::new(),
            &Topology::default(),
            0,
            AudioFormat::new(1, 8, 8000),
            ToneParams::default(),
            Arc::new(DeviceState::new()),
        )
        .unwrap_err();
        assert!(matches!(err, VirtualMicError::InvalidFormat { .. }));
    }
}
