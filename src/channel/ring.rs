//! Bounded byte ring shared by one writer and one reader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use crate::channel::ChannelName;
use crate::config::BlockingMode;
use crate::ChannelError;

/// Byte counters for one channel session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Bytes accepted from the producer.
    pub bytes_written: u64,
    /// Bytes handed to the consumer.
    pub bytes_read: u64,
}

struct RingState {
    ring: HeapRb<u8>,
    closed: bool,
    reader_attached: bool,
}

/// Channel state owned by the producer side.
///
/// One mutex serializes the ring; `drained` wakes a writer waiting for space
/// (or for a flush) whenever the reader pops bytes or either side closes.
pub(crate) struct SharedChannel {
    name: ChannelName,
    capacity: usize,
    state: Mutex<RingState>,
    drained: Condvar,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl SharedChannel {
    /// `capacity` must be non-zero; the registry validates it.
    pub(crate) fn new(name: ChannelName, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            state: Mutex::new(RingState {
                ring: HeapRb::new(capacity),
                closed: false,
                reader_attached: false,
            }),
            drained: Condvar::new(),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &ChannelName {
        &self.name
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn queued(&self) -> usize {
        self.state.lock().ring.occupied_len()
    }

    pub(crate) fn has_reader(&self) -> bool {
        self.state.lock().reader_attached
    }

    pub(crate) fn stats(&self) -> ChannelStats {
        ChannelStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }

    /// Marks the reader slot as taken. Returns `false` if it already was.
    pub(crate) fn attach_reader(&self) -> bool {
        let mut state = self.state.lock();
        if state.reader_attached {
            return false;
        }
        state.reader_attached = true;
        true
    }

    pub(crate) fn detach_reader(&self) {
        self.state.lock().reader_attached = false;
    }

    /// Ends the session for both sides and discards unread bytes.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let discarded = state.ring.clear();
        drop(state);

        tracing::debug!(channel = %self.name, discarded, "channel closed");
        self.drained.notify_all();
    }

    /// Queues all of `data` or fails without losing bytes silently.
    pub(crate) fn write(
        &self,
        data: &[u8],
        mode: BlockingMode,
        timeout: Option<Duration>,
    ) -> Result<usize, ChannelError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelError::ChannelClosed);
        }
        if data.is_empty() {
            return Ok(0);
        }

        match mode {
            BlockingMode::NonBlocking => {
                if data.len() > self.capacity {
                    return Err(ChannelError::TooLarge {
                        len: data.len(),
                        capacity: self.capacity,
                    });
                }
                let vacant = state.ring.vacant_len();
                if vacant < data.len() {
                    return Err(ChannelError::WouldBlock {
                        requested: data.len(),
                        vacant,
                    });
                }
                let pushed = state.ring.push_slice(data);
                self.bytes_written
                    .fetch_add(pushed as u64, Ordering::Relaxed);
            }
            BlockingMode::Blocking => {
                let deadline = timeout.map(|t| Instant::now() + t);
                let mut written = 0;
                loop {
                    let pushed = state.ring.push_slice(&data[written..]);
                    written += pushed;
                    self.bytes_written
                        .fetch_add(pushed as u64, Ordering::Relaxed);
                    if written == data.len() {
                        break;
                    }

                    match deadline {
                        Some(deadline) => {
                            if self.drained.wait_until(&mut state, deadline).timed_out()
                                && !state.closed
                            {
                                return Err(ChannelError::TimedOut { written });
                            }
                        }
                        None => self.drained.wait(&mut state),
                    }

                    if state.closed {
                        return Err(ChannelError::ChannelClosed);
                    }
                }
            }
        }

        Ok(data.len())
    }

    /// Pops up to `buf.len()` bytes, rounded down to a multiple of `align`.
    pub(crate) fn read(&self, buf: &mut [u8], align: usize) -> Result<usize, ChannelError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelError::ChannelClosed);
        }
        if align > self.capacity {
            return Err(ChannelError::FrameTooLarge {
                frame_size: align,
                capacity: self.capacity,
            });
        }

        let available = state.ring.occupied_len().min(buf.len());
        let len = available - available % align.max(1);
        let popped = state.ring.pop_slice(&mut buf[..len]);
        drop(state);

        if popped > 0 {
            self.bytes_read.fetch_add(popped as u64, Ordering::Relaxed);
            self.drained.notify_all();
        }
        Ok(popped)
    }

    /// Blocks until the reader has drained every queued byte.
    pub(crate) fn flush(&self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(ChannelError::ChannelClosed);
            }
            if state.ring.is_empty() {
                return Ok(());
            }
            self.drained.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(capacity: usize) -> SharedChannel {
        SharedChannel::new(ChannelName::new("test"), capacity)
    }

    #[test]
    fn test_write_then_read() {
        let ch = channel(16);
        assert_eq!(ch.write(&[1, 2, 3, 4], BlockingMode::Blocking, None), Ok(4));
        assert_eq!(ch.queued(), 4);

        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf, 1), Ok(4));
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(
            ch.stats(),
            ChannelStats {
                bytes_written: 4,
                bytes_read: 4
            }
        );
    }

    #[test]
    fn test_read_is_frame_aligned() {
        let ch = channel(16);
        ch.write(&[1, 2, 3, 4, 5], BlockingMode::NonBlocking, None)
            .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf, 2), Ok(4));
        assert_eq!(ch.queued(), 1);
        assert_eq!(ch.read(&mut buf, 2), Ok(0));
    }

    #[test]
    fn test_frame_larger_than_capacity_rejected() {
        let ch = channel(3);
        ch.write(&[1, 2, 3], BlockingMode::NonBlocking, None)
            .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(
            ch.read(&mut buf, 4),
            Err(ChannelError::FrameTooLarge {
                frame_size: 4,
                capacity: 3
            })
        );
        assert_eq!(ch.queued(), 3);
    }

    #[test]
    fn test_non_blocking_is_all_or_nothing() {
        let ch = channel(8);
        ch.write(&[0; 6], BlockingMode::NonBlocking, None).unwrap();

        let result = ch.write(&[0; 4], BlockingMode::NonBlocking, None);
        assert_eq!(
            result,
            Err(ChannelError::WouldBlock {
                requested: 4,
                vacant: 2
            })
        );
        assert_eq!(ch.queued(), 6);
    }

    #[test]
    fn test_non_blocking_too_large() {
        let ch = channel(8);
        assert_eq!(
            ch.write(&[0; 9], BlockingMode::NonBlocking, None),
            Err(ChannelError::TooLarge {
                len: 9,
                capacity: 8
            })
        );
    }

    #[test]
    fn test_blocking_write_times_out() {
        let ch = channel(4);
        let result = ch.write(
            &[7; 6],
            BlockingMode::Blocking,
            Some(Duration::from_millis(20)),
        );
        assert_eq!(result, Err(ChannelError::TimedOut { written: 4 }));
        assert_eq!(ch.queued(), 4);
    }

    #[test]
    fn test_timed_out_prefix_realigns_once_frame_completed() {
        let ch = channel(6);
        let data: Vec<u8> = (1..=12).collect();
        let result = ch.write(&data, BlockingMode::Blocking, Some(Duration::from_millis(20)));
        assert_eq!(result, Err(ChannelError::TimedOut { written: 6 }));

        // Only the whole first frame is readable; half of the second waits
        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf, 4), Ok(4));
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(ch.read(&mut buf, 4), Ok(0));

        // Finishing the frame from where the write stopped keeps frames intact
        ch.write(&data[6..8], BlockingMode::Blocking, None).unwrap();
        assert_eq!(ch.read(&mut buf, 4), Ok(4));
        assert_eq!(&buf[..4], &[5, 6, 7, 8]);
    }

    #[test]
    fn test_close_discards_and_rejects() {
        let ch = channel(8);
        ch.write(&[1, 2], BlockingMode::Blocking, None).unwrap();
        ch.close();

        assert!(ch.is_closed());
        assert_eq!(ch.queued(), 0);
        let mut buf = [0u8; 2];
        assert_eq!(ch.read(&mut buf, 1), Err(ChannelError::ChannelClosed));
        assert_eq!(
            ch.write(&[], BlockingMode::Blocking, None),
            Err(ChannelError::ChannelClosed)
        );
    }

    #[test]
    fn test_reader_slot() {
        let ch = channel(8);
        assert!(ch.attach_reader());
        assert!(!ch.attach_reader());
        ch.detach_reader();
        assert!(ch.attach_reader());
    }
}
