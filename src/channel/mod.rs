//! Named single-producer/single-consumer byte channels.
//!
//! An external producer creates a channel under a well-known name and writes
//! raw interleaved PCM into it. The capture side opens the same name and
//! drains it at its own cadence:
//!
//! ```text
//! Producer → ChannelWriter → [bounded ring] → ChannelReader → capture fill
//! ```
//!
//! - The writer owns the channel; the reader holds only a weak reference and
//!   never keeps a channel alive after its producer is gone
//! - Backpressure is the only synchronization between the two sides
//! - Closing either end ends the session for both

mod name;
mod ring;

pub use name::{pipe_name, ChannelName, PIPE_NAME_PREFIX};
pub use ring::ChannelStats;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::{BlockingMode, ChannelConfig};
use crate::{ChannelError, VirtualMicError};
use ring::SharedChannel;

type ChannelMap = HashMap<ChannelName, Weak<SharedChannel>>;

/// Name space in which producers create channels and consumers find them.
///
/// Cloning is cheap; every clone sees the same channels.
///
/// # Example
///
/// ```
/// use virtual_mic::{pipe_name, ChannelConfig, ChannelRegistry};
///
/// let registry = ChannelRegistry::new();
/// let writer = registry.create(pipe_name(0), ChannelConfig::default())?;
/// let mut reader = registry.open(pipe_name(0))?;
///
/// writer.write(&[1, 2, 3, 4])?;
/// let mut buf = [0u8; 4];
/// assert_eq!(reader.read(&mut buf)?, 4);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<ChannelMap>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel and returns its producer end.
    ///
    /// # Errors
    ///
    /// - [`VirtualMicError::InvalidConfig`] if the configuration is rejected
    /// - [`VirtualMicError::AlreadyOpen`] if a producer already holds `name` open
    pub fn create(
        &self,
        name: impl Into<ChannelName>,
        config: ChannelConfig,
    ) -> Result<ChannelWriter, VirtualMicError> {
        config.validate()?;
        let name = name.into();

        let mut channels = self.channels.lock();
        if let Some(existing) = channels.get(&name).and_then(Weak::upgrade) {
            if !existing.is_closed() {
                return Err(VirtualMicError::AlreadyOpen {
                    name: name.to_string(),
                });
            }
        }

        let shared = Arc::new(SharedChannel::new(name.clone(), config.capacity_bytes));
        channels.insert(name.clone(), Arc::downgrade(&shared));
        drop(channels);

        tracing::info!(
            channel = %name,
            capacity = config.capacity_bytes,
            mode = ?config.blocking,
            "channel created"
        );

        Ok(ChannelWriter {
            shared,
            config,
            registry: self.clone(),
        })
    }

    /// Attaches the consumer end of a live channel.
    ///
    /// # Errors
    ///
    /// - [`VirtualMicError::ChannelNotFound`] if no open channel has this name
    /// - [`VirtualMicError::AlreadyOpen`] if a consumer is already attached
    pub fn open(&self, name: impl Into<ChannelName>) -> Result<ChannelReader, VirtualMicError> {
        let name = name.into();
        let shared = self
            .lookup(&name)
            .ok_or_else(|| VirtualMicError::ChannelNotFound {
                name: name.to_string(),
            })?;

        if !shared.attach_reader() {
            return Err(VirtualMicError::AlreadyOpen {
                name: name.to_string(),
            });
        }

        tracing::debug!(channel = %name, "consumer attached");
        Ok(ChannelReader {
            name,
            shared: Arc::downgrade(&shared),
        })
    }

    /// Returns `true` if a producer currently holds `name` open.
    pub fn contains(&self, name: &ChannelName) -> bool {
        self.lookup(name).is_some()
    }

    /// Names of every open channel, sorted.
    pub fn names(&self) -> Vec<ChannelName> {
        let channels = self.channels.lock();
        let mut names: Vec<_> = channels
            .iter()
            .filter(|(_, weak)| weak.upgrade().is_some_and(|s| !s.is_closed()))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &ChannelName) -> Option<Arc<SharedChannel>> {
        self.channels
            .lock()
            .get(name)
            .and_then(Weak::upgrade)
            .filter(|shared| !shared.is_closed())
    }

    fn release(&self, shared: &Arc<SharedChannel>) {
        let mut channels = self.channels.lock();
        let owned = channels
            .get(shared.name())
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(shared)));
        if owned {
            channels.remove(shared.name());
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .finish()
    }
}

/// Producer end of a channel. Dropping it closes the channel.
///
/// Methods take `&self`, so a writer can be shared in an `Arc` between the
/// thread that writes and the thread that decides to close.
pub struct ChannelWriter {
    shared: Arc<SharedChannel>,
    config: ChannelConfig,
    registry: ChannelRegistry,
}

impl ChannelWriter {
    /// Name of this channel.
    pub fn name(&self) -> &ChannelName {
        self.shared.name()
    }

    /// Configuration the channel was created with.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Writes all of `data` using the configured [`BlockingMode`].
    ///
    /// A zero-length write on an open channel returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::ChannelClosed`] if either side closed, including while
    ///   this call was waiting for space
    /// - [`ChannelError::WouldBlock`] / [`ChannelError::TooLarge`] in non-blocking mode
    /// - [`ChannelError::TimedOut`] if a configured write timeout elapsed
    pub fn write(&self, data: &[u8]) -> Result<usize, ChannelError> {
        self.shared
            .write(data, self.config.blocking, self.config.write_timeout)
    }

    /// Writes all of `data` or nothing, never waiting.
    ///
    /// # Errors
    ///
    /// Same as a non-blocking [`write`](Self::write).
    pub fn try_write(&self, data: &[u8]) -> Result<usize, ChannelError> {
        self.shared.write(data, BlockingMode::NonBlocking, None)
    }

    /// Blocks until the consumer has drained every queued byte.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelClosed`] if the channel closes first.
    pub fn flush(&self) -> Result<(), ChannelError> {
        self.shared.flush()
    }

    /// Closes the channel. Unread bytes are discarded and a blocked
    /// [`write`](Self::write) wakes with [`ChannelError::ChannelClosed`].
    pub fn close(&self) {
        self.shared.close();
        self.registry.release(&self.shared);
    }

    /// Returns `true` once either side has closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns `true` if a consumer is attached.
    pub fn has_reader(&self) -> bool {
        self.shared.has_reader()
    }

    /// Bytes waiting for the consumer.
    pub fn queued(&self) -> usize {
        self.shared.queued()
    }

    /// Total buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Byte counters for this session.
    pub fn stats(&self) -> ChannelStats {
        self.shared.stats()
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("name", self.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What a [`ChannelReader::fill`] call delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Bytes taken from the channel.
    pub delivered: usize,
    /// Bytes padded with silence because the channel ran dry.
    pub silence: usize,
}

/// Consumer end of a channel.
///
/// Holds a weak reference: once the producer drops its writer, every call
/// returns [`ChannelError::ChannelClosed`].
#[derive(Debug)]
pub struct ChannelReader {
    name: ChannelName,
    shared: Weak<SharedChannel>,
}

impl ChannelReader {
    /// Name of this channel.
    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Pops up to `buf.len()` bytes without waiting. Returns 0 when empty.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelClosed`] if either side has closed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.read_frames(buf, 1)
    }

    /// Pops only whole frames of `frame_size` bytes, without waiting.
    ///
    /// A partially written frame stays queued until the producer completes it.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::ChannelClosed`] if either side has closed
    /// - [`ChannelError::FrameTooLarge`] if `frame_size` exceeds the channel
    ///   capacity, so no frame could ever be read
    pub fn read_frames(&mut self, buf: &mut [u8], frame_size: usize) -> Result<usize, ChannelError> {
        self.upgrade()?.read(buf, frame_size)
    }

    /// Fills `buf` with whole frames from the channel and pads the rest with
    /// `silence`. An empty channel yields a buffer of silence, not an error.
    ///
    /// # Errors
    ///
    /// Same as [`read_frames`](Self::read_frames); `buf` is left untouched on
    /// error.
    pub fn fill(
        &mut self,
        buf: &mut [u8],
        frame_size: usize,
        silence: u8,
    ) -> Result<FillOutcome, ChannelError> {
        let delivered = self.read_frames(buf, frame_size)?;
        buf[delivered..].fill(silence);
        Ok(FillOutcome {
            delivered,
            silence: buf.len() - delivered,
        })
    }

    /// Bytes currently queued by the producer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelClosed`] if either side has closed.
    pub fn available(&self) -> Result<usize, ChannelError> {
        Ok(self.upgrade()?.queued())
    }

    /// Byte counters for this session, or `None` once the producer is gone.
    pub fn stats(&self) -> Option<ChannelStats> {
        self.shared.upgrade().map(|shared| shared.stats())
    }

    /// Closes the channel from the consumer side.
    pub fn close(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.close();
        }
    }

    fn upgrade(&self) -> Result<Arc<SharedChannel>, ChannelError> {
        self.shared
            .upgrade()
            .filter(|shared| !shared.is_closed())
            .ok_or(ChannelError::ChannelClosed)
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.detach_reader();
        }
    }
}
