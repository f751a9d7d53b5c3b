//! Error types for virtual-mic.
//!
//! Errors are split by where they surface:
//! - **Fatal errors** ([`VirtualMicError`]): a component cannot be created
//!   (bad format, name collision, unknown pin)
//! - **Transport errors** ([`ChannelError`]): runtime failures on an open channel
//! - **Control errors** ([`ControlError`]): a control query was rejected
//! - **Producer errors** ([`ProducerError`]): the reference producer's send loop aborted

/// Fatal errors that prevent a component from being created.
///
/// These are returned from constructors such as [`ToneGenerator::new()`] and
/// [`ChannelRegistry::create()`]. Nothing is allocated or registered when one
/// of these is returned.
///
/// [`ToneGenerator::new()`]: crate::ToneGenerator::new
/// [`ChannelRegistry::create()`]: crate::ChannelRegistry::create
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VirtualMicError {
    /// The audio format cannot be rendered (zero frame size, unsupported bit depth, zero rate).
    #[error("invalid format: {reason}")]
    InvalidFormat {
        /// What is wrong with the format.
        reason: String,
    },

    /// A tone parameter is not a finite number.
    #[error("invalid tone parameter: {reason}")]
    InvalidTone {
        /// Which parameter was rejected.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The channel already has a live producer (on create) or consumer (on open).
    #[error("channel already open: {name}")]
    AlreadyOpen {
        /// Name of the channel.
        name: String,
    },

    /// No live producer has created a channel with this name.
    #[error("channel not found: {name}")]
    ChannelNotFound {
        /// Name of the channel.
        name: String,
    },

    /// The topology has no endpoint for the requested pin.
    #[error("no endpoint for pin {pin}")]
    UnknownPin {
        /// The requested pin index.
        pin: u32,
    },
}

impl VirtualMicError {
    /// Creates an invalid format error with the given reason.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Creates an invalid tone error with the given reason.
    pub fn invalid_tone(reason: impl Into<String>) -> Self {
        Self::InvalidTone {
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Errors on an open channel.
///
/// Transport errors are reported to the side that issued the operation; the
/// crate never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// A non-blocking write did not fit in the free buffer space. Nothing was queued.
    #[error("write would block ({requested} bytes requested, {vacant} free)")]
    WouldBlock {
        /// Bytes the caller tried to write.
        requested: usize,
        /// Free space at the time of the call.
        vacant: usize,
    },

    /// A non-blocking write is larger than the whole channel capacity.
    #[error("write of {len} bytes exceeds channel capacity of {capacity} bytes")]
    TooLarge {
        /// Bytes the caller tried to write.
        len: usize,
        /// Total channel capacity.
        capacity: usize,
    },

    /// A blocking write hit the configured write timeout.
    ///
    /// The `written` bytes stay queued and may end mid-frame.
    #[error("write timed out after queueing {written} bytes")]
    TimedOut {
        /// Bytes queued before the timeout fired.
        written: usize,
    },

    /// A frame-aligned read asked for frames that can never fit in the channel.
    #[error("{frame_size}-byte frames do not fit a {capacity}-byte channel")]
    FrameTooLarge {
        /// Requested frame size in bytes.
        frame_size: usize,
        /// Total channel capacity.
        capacity: usize,
    },

    /// Either end closed the channel.
    #[error("channel closed")]
    ChannelClosed,
}

/// Errors returned by control-plane queries.
///
/// On any error the caller's output buffer is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// Invalid handle or undersized output buffer.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the request was rejected.
        reason: String,
    },

    /// The raw control code does not name a known operation.
    #[error("unsupported control code {code:#010x}")]
    UnsupportedCode {
        /// The raw code that was rejected.
        code: u32,
    },
}

impl ControlError {
    /// Creates an invalid argument error with the given reason.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Errors that abort the reference producer's send loop.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// Writing to the channel failed mid-stream.
    #[error("transport error: {0}")]
    Transport(#[from] ChannelError),

    /// Reading forwarded audio failed.
    #[error("input error: {0}")]
    Input(#[from] std::io::Error),

    /// A pattern segment could not be rendered in the channel's format.
    #[error("render error: {0}")]
    Render(#[from] VirtualMicError),

    /// The blocking write worker panicked or was cancelled by the runtime.
    #[error("write worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_mic_error_display() {
        let err = VirtualMicError::AlreadyOpen {
            name: r"\\.\pipe\VirtualMicInput_0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            r"channel already open: \\.\pipe\VirtualMicInput_0"
        );
    }

    #[test]
    fn test_invalid_format_helper() {
        let err = VirtualMicError::invalid_format("frame size is zero");
        assert_eq!(err.to_string(), "invalid format: frame size is zero");
    }

    #[test]
    fn test_channel_error_would_block() {
        let err = ChannelError::WouldBlock {
            requested: 4096,
            vacant: 100,
        };
        assert_eq!(
            err.to_string(),
            "write would block (4096 bytes requested, 100 free)"
        );
    }

    #[test]
    fn test_control_error_unsupported_code() {
        let err = ControlError::UnsupportedCode { code: 0x8000_2008 };
        assert_eq!(err.to_string(), "unsupported control code 0x80002008");
    }

    #[test]
    fn test_producer_error_from_channel() {
        let err: ProducerError = ChannelError::ChannelClosed.into();
        assert!(matches!(err, ProducerError::Transport(ChannelError::ChannelClosed)));
        assert_eq!(err.to_string(), "transport error: channel closed");
    }
}
