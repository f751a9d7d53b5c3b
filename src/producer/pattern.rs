//! The reference producer's repeating test patterns.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::source::{ToneGenerator, ToneParams};
use crate::{AudioFormat, VirtualMicError};

/// Peak amplitude of every tone in the reference pattern.
pub const PATTERN_AMPLITUDE: f64 = 16000.0;

/// Seed of the noise generator unless a pattern sets its own.
pub const DEFAULT_NOISE_SEED: u64 = 0x5EED_0001;

/// Frequencies of the sweep in [`TestPattern::extended`], in Hz.
pub const SWEEP_FREQUENCIES: [f64; 6] = [200.0, 400.0, 800.0, 1200.0, 1600.0, 2000.0];

/// One step of a [`TestPattern`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    /// A sine tone starting at phase 0, followed by a pause.
    Tone {
        /// Tone frequency in Hz.
        frequency: f64,
        /// Length of the rendered audio.
        duration: Duration,
        /// Wait after sending.
        pause: Duration,
    },
    /// Gaussian white noise, the same on every channel, followed by a pause.
    Noise {
        /// Standard deviation as a fraction of the pattern amplitude.
        amplitude: f64,
        /// Length of the rendered audio.
        duration: Duration,
        /// Wait after sending.
        pause: Duration,
    },
    /// Digital silence, followed by a pause.
    Silence {
        /// Length of the rendered audio.
        duration: Duration,
        /// Wait after sending.
        pause: Duration,
    },
}

impl Segment {
    /// Tones at each of `frequencies`, each lasting `duration` and followed by `gap`.
    pub fn sweep(frequencies: &[f64], duration: Duration, gap: Duration) -> Vec<Self> {
        frequencies
            .iter()
            .map(|&frequency| Self::Tone {
                frequency,
                duration,
                pause: gap,
            })
            .collect()
    }

    /// Length of the audio this segment sends.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Tone { duration, .. }
            | Self::Noise { duration, .. }
            | Self::Silence { duration, .. } => *duration,
        }
    }

    /// Wait after this segment is sent.
    pub fn pause(&self) -> Duration {
        match self {
            Self::Tone { pause, .. } | Self::Noise { pause, .. } | Self::Silence { pause, .. } => {
                *pause
            }
        }
    }

    /// Renders the segment as PCM in `format`.
    ///
    /// `amplitude` scales tones and noise; `seed` makes noise reproducible.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError`] if the format or tone parameters are rejected.
    pub fn render(
        &self,
        format: AudioFormat,
        amplitude: f64,
        seed: u64,
    ) -> Result<Vec<u8>, VirtualMicError> {
        let width = format.validate()?;
        let len = format.bytes_for(self.duration());
        match *self {
            Self::Tone { frequency, .. } => {
                let mut tone = ToneGenerator::new(ToneParams::sine(frequency, amplitude), format)?;
                let mut buf = vec![0u8; len];
                tone.generate_sine(&mut buf);
                Ok(buf)
            }
            Self::Noise {
                amplitude: relative,
                ..
            } => {
                let sigma = relative * amplitude;
                if !sigma.is_finite() {
                    return Err(VirtualMicError::invalid_tone(format!(
                        "noise amplitude must be finite, got {sigma}"
                    )));
                }

                let mut rng = Pcg32::seed_from_u64(seed);
                // Symmetric clip: the most negative code is never produced
                let peak = width.max_value();
                let mut buf = vec![0u8; len];
                for frame in buf.chunks_exact_mut(format.frame_size()) {
                    let sample = width.quantize(sigma * gaussian(&mut rng)).clamp(-peak, peak);
                    for slot in frame.chunks_exact_mut(width.bytes()) {
                        width.write(sample, slot);
                    }
                }
                Ok(buf)
            }
            Self::Silence { .. } => Ok(vec![format.silence_byte(); len]),
        }
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        let seconds = self.duration().as_secs_f64();
        match self {
            Self::Tone { frequency, .. } => format!("{seconds:.1}s of {frequency}Hz sine wave"),
            Self::Noise { .. } => format!("{seconds:.1}s of white noise"),
            Self::Silence { .. } => format!("{seconds:.1}s of silence"),
        }
    }
}

/// Standard normal sample by the Box-Muller transform.
fn gaussian(rng: &mut impl Rng) -> f64 {
    // 1 - [0, 1) keeps ln away from zero
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// A sequence of segments the producer repeats until stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPattern {
    segments: Vec<Segment>,
    amplitude: f64,
    seed: u64,
}

impl TestPattern {
    /// Creates a pattern from explicit segments at [`PATTERN_AMPLITUDE`].
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            amplitude: PATTERN_AMPLITUDE,
            seed: DEFAULT_NOISE_SEED,
        }
    }

    /// 440 Hz, 880 Hz, one second of silence, then 1000 Hz.
    ///
    /// Each part lasts one second. The first three are followed by a 100 ms
    /// pause and the last by a one second pause.
    pub fn reference() -> Self {
        let second = Duration::from_secs(1);
        let short = Duration::from_millis(100);
        Self::new(vec![
            Segment::Tone {
                frequency: 440.0,
                duration: second,
                pause: short,
            },
            Segment::Tone {
                frequency: 880.0,
                duration: second,
                pause: short,
            },
            Segment::Silence {
                duration: second,
                pause: short,
            },
            Segment::Tone {
                frequency: 1000.0,
                duration: second,
                pause: second,
            },
        ])
    }

    /// 440 Hz, 880 Hz, half a second of noise, silence, then a sweep.
    ///
    /// The tones and the silence last one second and the noise (standard
    /// deviation 0.1 of full pattern amplitude) half a second, each followed
    /// by 100 ms. The sweep plays [`SWEEP_FREQUENCIES`] for 300 ms each with
    /// 50 ms gaps, and the cycle ends with an extra second of pause.
    pub fn extended() -> Self {
        let second = Duration::from_secs(1);
        let short = Duration::from_millis(100);
        let mut segments = vec![
            Segment::Tone {
                frequency: 440.0,
                duration: second,
                pause: short,
            },
            Segment::Tone {
                frequency: 880.0,
                duration: second,
                pause: short,
            },
            Segment::Noise {
                amplitude: 0.1,
                duration: Duration::from_millis(500),
                pause: short,
            },
            Segment::Silence {
                duration: second,
                pause: short,
            },
        ];
        segments.extend(Segment::sweep(
            &SWEEP_FREQUENCIES,
            Duration::from_millis(300),
            Duration::from_millis(50),
        ));
        if let Some(Segment::Tone { pause, .. }) = segments.last_mut() {
            *pause += second;
        }
        Self::new(segments)
    }

    /// Sets the peak amplitude of every tone.
    #[must_use]
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Sets the seed of the noise generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The segments in send order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Peak amplitude of every tone.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Seed of the noise generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Audio plus pauses for one pass over the pattern.
    pub fn cycle_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration() + s.pause()).sum()
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::reference()
    }
}
