//! Phase-continuous sine tone generator.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::format::{AudioFormat, SampleWidth};
use crate::VirtualMicError;

/// Parameters of a generated tone.
///
/// `amplitude` and `dc_offset` are in raw sample units of the target bit
/// depth (16000 is roughly half scale at 16-bit).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    /// Tone frequency in Hz. Zero yields a constant level.
    pub frequency: f64,
    /// Peak amplitude in sample units.
    pub amplitude: f64,
    /// Constant added to every sample, in sample units.
    pub dc_offset: f64,
    /// Starting phase in radians; any value, wrapped into `[0, 2π)`.
    pub initial_phase: f64,
}

impl ToneParams {
    /// A tone at `frequency` Hz with `amplitude`, no DC offset, phase 0.
    pub fn sine(frequency: f64, amplitude: f64) -> Self {
        Self {
            frequency,
            amplitude,
            dc_offset: 0.0,
            initial_phase: 0.0,
        }
    }

    fn validate(&self) -> Result<(), VirtualMicError> {
        let fields = [
            ("frequency", self.frequency),
            ("amplitude", self.amplitude),
            ("dc_offset", self.dc_offset),
            ("initial_phase", self.initial_phase),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(VirtualMicError::invalid_tone(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ToneParams {
    fn default() -> Self {
        Self::sine(1000.0, 16000.0)
    }
}

/// Whether the phase accumulator keeps running while muted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutePhasePolicy {
    /// `theta` advances on every frame, muted or not. Unmuting resumes exactly
    /// where an unmuted run would be.
    #[default]
    Advance,
    /// `theta` is frozen while muted. Unmuting resumes the waveform from the
    /// sample at which it was muted.
    Hold,
}

/// Shared mute flag for a [`ToneGenerator`].
///
/// Cloning is cheap and every clone controls the same generator, so the flag
/// can be toggled from a control thread while the capture thread fills.
#[derive(Debug, Clone, Default)]
pub struct MuteControl(Arc<AtomicBool>);

impl MuteControl {
    /// Sets or clears the mute flag.
    pub fn set(&self, muted: bool) {
        self.0.store(muted, Ordering::Release);
    }

    /// Returns the current flag.
    pub fn is_muted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Generates a sine wave as interleaved PCM bytes on demand.
///
/// Output is phase-continuous across calls of any length. When a call ends in
/// the middle of a frame, the whole frame is rendered, the bytes the caller
/// had no room for are kept back, and they open the next call. Any sequence of
/// calls adding up to `k` whole frames produces the same bytes as a single
/// call of `k` frames.
///
/// # Mute timing
///
/// The mute flag is read once at the start of every
/// [`generate_sine`](Self::generate_sine) call. A toggle that lands while a
/// call is running takes effect with the next call; bytes already held back
/// from a split frame keep the level they were rendered with.
///
/// # Example
///
/// ```
/// use virtual_mic::{AudioFormat, ToneGenerator, ToneParams};
///
/// let format = AudioFormat::new(1, 16, 8000);
/// let mut tone = ToneGenerator::new(ToneParams::sine(440.0, 16000.0), format)?;
///
/// let mut a = [0u8; 3];
/// let mut b = [0u8; 1];
/// tone.generate_sine(&mut a);
/// tone.generate_sine(&mut b);
/// assert_eq!(tone.pending_bytes(), 0);
/// # Ok::<(), virtual_mic::VirtualMicError>(())
/// ```
#[derive(Debug)]
pub struct ToneGenerator {
    format: AudioFormat,
    width: SampleWidth,
    params: ToneParams,
    theta: f64,
    sample_increment: f64,
    mute: MuteControl,
    mute_policy: MutePhasePolicy,
    /// One frame of scratch; the last `carry_len` bytes are still owed to the caller.
    carry: Vec<u8>,
    carry_len: usize,
}

impl ToneGenerator {
    /// Creates a generator for `format`, starting at `params.initial_phase`.
    ///
    /// # Errors
    ///
    /// - [`VirtualMicError::InvalidFormat`] if the format cannot be rendered
    /// - [`VirtualMicError::InvalidTone`] if any parameter is NaN or infinite
    pub fn new(params: ToneParams, format: AudioFormat) -> Result<Self, VirtualMicError> {
        Self::with_policy(params, format, MutePhasePolicy::default())
    }

    /// Creates a generator with an explicit [`MutePhasePolicy`].
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_policy(
        params: ToneParams,
        format: AudioFormat,
        mute_policy: MutePhasePolicy,
    ) -> Result<Self, VirtualMicError> {
        let width = format.validate()?;
        params.validate()?;

        Ok(Self {
            format,
            width,
            params,
            theta: params.initial_phase.rem_euclid(TAU),
            sample_increment: TAU * params.frequency / f64::from(format.sample_rate),
            mute: MuteControl::default(),
            mute_policy,
            carry: vec![0; format.frame_size()],
            carry_len: 0,
        })
    }

    /// Fills all of `buf` with continuous sine PCM.
    ///
    /// An empty buffer is a no-op.
    pub fn generate_sine(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }

        let muted = self.mute.is_muted();
        let frame_size = self.carry.len();
        let mut written = 0;

        if self.carry_len > 0 {
            let n = self.carry_len.min(buf.len());
            let start = frame_size - self.carry_len;
            buf[..n].copy_from_slice(&self.carry[start..start + n]);
            self.carry_len -= n;
            written = n;
        }

        let mut frames = buf[written..].chunks_exact_mut(frame_size);
        for frame in &mut frames {
            self.render_frame(frame, muted);
        }

        let tail = frames.into_remainder();
        if !tail.is_empty() {
            let mut scratch = std::mem::take(&mut self.carry);
            self.render_frame(&mut scratch, muted);
            tail.copy_from_slice(&scratch[..tail.len()]);
            self.carry_len = frame_size - tail.len();
            self.carry = scratch;
        }
    }

    /// Sets the mute flag. Does not touch the phase or held-back bytes.
    pub fn set_mute(&self, muted: bool) {
        self.mute.set(muted);
    }

    /// Returns `true` if the generator is muted.
    pub fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    /// Returns a handle that toggles this generator's mute flag from elsewhere.
    pub fn mute_control(&self) -> MuteControl {
        self.mute.clone()
    }

    /// The format this generator renders.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// The parameters this generator was created with.
    pub fn params(&self) -> ToneParams {
        self.params
    }

    /// Phase of the next frame to be rendered, in `[0, 2π)`.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Bytes of a split frame that the next call will emit first.
    pub fn pending_bytes(&self) -> usize {
        self.carry_len
    }

    fn render_frame(&mut self, frame: &mut [u8], muted: bool) {
        let level = if muted {
            self.params.dc_offset
        } else {
            self.params.amplitude * self.theta.sin() + self.params.dc_offset
        };
        let sample = self.width.quantize(level);

        for slot in frame.chunks_exact_mut(self.width.bytes()) {
            self.width.write(sample, slot);
        }

        if !muted || self.mute_policy == MutePhasePolicy::Advance {
            self.theta += self.sample_increment;
            if !(0.0..TAU).contains(&self.theta) {
                self.theta = self.theta.rem_euclid(TAU);
            }
        }
    }
}
