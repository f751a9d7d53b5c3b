//! Configuration types for channels.

use std::time::Duration;

use crate::{AudioFormat, VirtualMicError};

/// What a producer write does when the channel buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockingMode {
    /// Wait until the consumer drains enough space (or the channel closes).
    #[default]
    Blocking,

    /// Fail with [`ChannelError::WouldBlock`] without queueing anything.
    ///
    /// [`ChannelError::WouldBlock`]: crate::ChannelError::WouldBlock
    NonBlocking,
}

/// Configuration for a producer channel.
///
/// Use [`ChannelConfig::default()`] for sensible defaults, or size the buffer
/// from a format with [`ChannelConfig::for_format`].
///
/// # Example
///
/// ```
/// use virtual_mic::{AudioFormat, BlockingMode, ChannelConfig};
/// use std::time::Duration;
///
/// let config = ChannelConfig {
///     blocking: BlockingMode::NonBlocking,
///     ..ChannelConfig::for_format(AudioFormat::PIPE_DEFAULT, Duration::from_millis(50))
/// };
/// assert_eq!(config.capacity_bytes, 8820);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Size of the channel buffer in bytes.
    ///
    /// Default: 17 640 bytes (100ms of 44.1kHz 16-bit stereo)
    pub capacity_bytes: usize,

    /// Behavior of writes that do not fit.
    ///
    /// Default: [`BlockingMode::Blocking`]
    pub blocking: BlockingMode,

    /// Upper bound on how long a blocking write waits for space.
    ///
    /// `None` waits until space frees or the channel closes. A write that
    /// times out leaves the bytes it already queued in the channel; if that
    /// prefix ends mid-frame, the producer must complete the frame before
    /// writing new audio or every later frame is misaligned.
    /// Default: `None`
    pub write_timeout: Option<Duration>,
}

impl ChannelConfig {
    /// Buffer sized to hold `duration` of audio in `format`.
    pub fn for_format(format: AudioFormat, duration: Duration) -> Self {
        Self {
            capacity_bytes: format.bytes_for(duration),
            ..Self::default()
        }
    }

    /// Checks that the configuration can back a channel.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::InvalidConfig`] if the capacity is zero.
    pub fn validate(&self) -> Result<(), VirtualMicError> {
        if self.capacity_bytes == 0 {
            return Err(VirtualMicError::invalid_config(
                "channel capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Checks the configuration against the format the channel will carry.
    ///
    /// The consumer only takes whole frames, so a buffer smaller than one
    /// frame could never drain and a blocking write would wait forever.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::InvalidConfig`] if the capacity is zero or
    /// smaller than one frame of `format`.
    pub fn validate_for(&self, format: AudioFormat) -> Result<(), VirtualMicError> {
        self.validate()?;
        let frame_size = format.frame_size();
        if self.capacity_bytes < frame_size {
            return Err(VirtualMicError::invalid_config(format!(
                "channel capacity of {} bytes is smaller than one {frame_size}-byte frame of {format}",
                self.capacity_bytes
            )));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: AudioFormat::PIPE_DEFAULT.bytes_for(Duration::from_millis(100)),
            blocking: BlockingMode::Blocking,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.capacity_bytes, 17_640);
        assert_eq!(config.blocking, BlockingMode::Blocking);
        assert_eq!(config.write_timeout, None);
    }

    #[test]
    fn test_channel_config_for_format() {
        let config =
            ChannelConfig::for_format(AudioFormat::new(1, 16, 8000), Duration::from_secs(1));
        assert_eq!(config.capacity_bytes, 16_000);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ChannelConfig {
            capacity_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VirtualMicError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_capacity_below_one_frame_rejected() {
        let config = ChannelConfig {
            capacity_bytes: 3,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let err = config.validate_for(AudioFormat::PIPE_DEFAULT).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: channel capacity of 3 bytes is smaller than one 4-byte frame of 2ch/16-bit/44100Hz"
        );

        let one_frame = ChannelConfig {
            capacity_bytes: 4,
            ..Default::default()
        };
        assert!(one_frame.validate_for(AudioFormat::PIPE_DEFAULT).is_ok());
    }
}
