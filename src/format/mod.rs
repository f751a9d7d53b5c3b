//! Negotiated PCM format and sample encoding.
//!
//! [`AudioFormat`] is the out-of-band agreement between the producer, the
//! channel and the capture side. The channel carries no headers, so both ends
//! must use the same format.

mod sample;

pub use sample::SampleWidth;

use std::time::Duration;

use crate::VirtualMicError;

/// Channel count, bit depth and sample rate of an interleaved PCM stream.
///
/// # Example
///
/// ```
/// use virtual_mic::AudioFormat;
///
/// let format = AudioFormat::new(2, 16, 44100);
/// assert_eq!(format.frame_size(), 4);
/// assert_eq!(format.bytes_per_second(), 176_400);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Number of interleaved channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Bits per sample; 8 (unsigned), 16, 24 or 32 (signed little-endian).
    pub bits_per_sample: u16,
    /// Frames per second in Hz.
    pub sample_rate: u32,
}

impl AudioFormat {
    /// The format the reference producer streams: 44.1kHz, 16-bit, stereo.
    pub const PIPE_DEFAULT: Self = Self::new(2, 16, 44100);

    /// Creates a format. No validation happens here; see [`validate`](Self::validate).
    pub const fn new(channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
        }
    }

    /// Bytes per sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes per frame: one sample for every channel.
    pub fn frame_size(&self) -> usize {
        usize::from(self.channels) * self.bytes_per_sample()
    }

    /// Bytes of audio per second of playback.
    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }

    /// Number of whole frames covering `duration`, rounded down.
    pub fn frames_for(&self, duration: Duration) -> usize {
        (f64::from(self.sample_rate) * duration.as_secs_f64()) as usize
    }

    /// Number of bytes for the whole frames covering `duration`.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        self.frames_for(duration) * self.frame_size()
    }

    /// The byte value that encodes silence in this format.
    ///
    /// 8-bit PCM is offset-binary, so silence is `0x80`; every wider depth is
    /// signed and silent at zero.
    pub fn silence_byte(&self) -> u8 {
        if self.bits_per_sample == 8 {
            0x80
        } else {
            0x00
        }
    }

    /// Checks that the format can be rendered and returns its sample encoding.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::InvalidFormat`] if the bit depth is not one of
    /// 8/16/24/32, the frame size computes to zero, or the sample rate is zero.
    pub fn validate(&self) -> Result<SampleWidth, VirtualMicError> {
        let width = SampleWidth::from_bits(self.bits_per_sample).ok_or_else(|| {
            VirtualMicError::invalid_format(format!(
                "unsupported bit depth {}",
                self.bits_per_sample
            ))
        })?;
        if self.frame_size() == 0 {
            return Err(VirtualMicError::invalid_format("frame size is zero"));
        }
        if self.sample_rate == 0 {
            return Err(VirtualMicError::invalid_format("sample rate is zero"));
        }
        Ok(width)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::PIPE_DEFAULT
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}ch/{}-bit/{}Hz",
            self.channels, self.bits_per_sample, self.sample_rate
        )
    }
}
