//! Reference producer: pushes audio into a pin's channel until stopped.
//!
//! The producer owns the channel. It creates it on startup, writes rendered
//! segments or forwarded PCM through it, and closes it on the way out so the
//! capture side falls back to its tone.
//!
//! Channel writes block, so each one runs on the blocking pool and races the
//! stop token; cancelling closes the channel, which wakes the pending write.

mod pattern;

pub use pattern::{
    Segment, TestPattern, DEFAULT_NOISE_SEED, PATTERN_AMPLITUDE, SWEEP_FREQUENCIES,
};

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::{pipe_name, ChannelRegistry, ChannelWriter};
use crate::config::ChannelConfig;
use crate::{AudioFormat, ProducerError, VirtualMicError};

/// Audio read per forwarded block.
const FORWARD_BLOCK: Duration = Duration::from_millis(100);

/// What the producer sends.
pub enum ProducerInput {
    /// Repeat a test pattern until stopped.
    Pattern(TestPattern),
    /// Forward raw PCM in the channel's format until EOF or stop.
    Forward(Box<dyn Read + Send>),
}

impl std::fmt::Debug for ProducerInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            Self::Forward(_) => f.write_str("Forward(..)"),
        }
    }
}

/// Counters for one producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Bytes accepted by the channel.
    pub bytes_sent: u64,
    /// Segments or forwarded blocks written.
    pub writes: u64,
    /// Complete passes over the test pattern.
    pub cycles: u64,
}

/// Outcome of one cancellable wait.
enum Step<T> {
    Done(T),
    Stopped,
}

/// Producer end of one pin's channel.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
/// use virtual_mic::{
///     AudioFormat, ChannelConfig, ChannelRegistry, PipeProducer, ProducerInput, TestPattern,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ChannelRegistry::new();
/// let producer = PipeProducer::create(
///     &registry,
///     0,
///     AudioFormat::PIPE_DEFAULT,
///     ChannelConfig::default(),
/// )?;
///
/// let stop = CancellationToken::new();
/// let stats = producer
///     .run(ProducerInput::Pattern(TestPattern::reference()), stop)
///     .await?;
/// println!("sent {} bytes", stats.bytes_sent);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PipeProducer {
    writer: Arc<ChannelWriter>,
    format: AudioFormat,
    stats: ProducerStats,
}

impl PipeProducer {
    /// Creates the channel for `pin` and takes its producer end.
    ///
    /// # Errors
    ///
    /// - [`VirtualMicError::InvalidFormat`] if `format` cannot be sent
    /// - [`VirtualMicError::InvalidConfig`] if the channel configuration is
    ///   rejected, including a capacity smaller than one frame of `format`
    /// - [`VirtualMicError::AlreadyOpen`] if another producer holds the pin
    pub fn create(
        registry: &ChannelRegistry,
        pin: u32,
        format: AudioFormat,
        config: ChannelConfig,
    ) -> Result<Self, VirtualMicError> {
        format.validate()?;
        config.validate_for(format)?;
        let writer = registry.create(pipe_name(pin), config)?;
        Ok(Self {
            writer: Arc::new(writer),
            format,
            stats: ProducerStats::default(),
        })
    }

    /// Format of the PCM this producer sends.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// The channel's producer end.
    pub fn writer(&self) -> &ChannelWriter {
        &self.writer
    }

    /// Sends `input` until it is exhausted or `stop` is cancelled, then closes
    /// the channel.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::Transport`] if a write fails; the channel is released
    /// - [`ProducerError::Input`] if forwarded input cannot be read
    /// - [`ProducerError::Render`] if a pattern segment cannot be rendered
    /// - [`ProducerError::Worker`] if a blocking worker task fails
    pub async fn run(
        mut self,
        input: ProducerInput,
        stop: CancellationToken,
    ) -> Result<ProducerStats, ProducerError> {
        tracing::info!(channel = %self.writer.name(), format = %self.format, "producer started");

        let result = match input {
            ProducerInput::Pattern(pattern) => self.run_pattern(&pattern, &stop).await,
            ProducerInput::Forward(reader) => self.run_forward(reader, &stop).await,
        };
        self.writer.close();

        match &result {
            Ok(()) => tracing::info!(stats = ?self.stats, "producer stopped"),
            Err(e) => tracing::error!(error = %e, stats = ?self.stats, "producer failed"),
        }
        result.map(|()| self.stats)
    }

    async fn run_pattern(
        &mut self,
        pattern: &TestPattern,
        stop: &CancellationToken,
    ) -> Result<(), ProducerError> {
        let mut rendered = Vec::with_capacity(pattern.segments().len());
        for segment in pattern.segments() {
            let pcm = segment.render(self.format, pattern.amplitude(), pattern.seed())?;
            rendered.push((segment, Arc::new(pcm)));
        }
        if rendered.is_empty() {
            stop.cancelled().await;
            return Ok(());
        }

        loop {
            for (segment, pcm) in &rendered {
                let Step::Done(written) = self.send(Arc::clone(pcm), stop).await? else {
                    return Ok(());
                };
                tracing::info!("sent {written} bytes ({})", segment.describe());

                if let Step::Stopped = pause(segment.pause(), stop).await {
                    return Ok(());
                }
            }
            self.stats.cycles += 1;
        }
    }

    async fn run_forward(
        &mut self,
        mut reader: Box<dyn Read + Send>,
        stop: &CancellationToken,
    ) -> Result<(), ProducerError> {
        let frame_size = self.format.frame_size();
        let block = self.format.bytes_for(FORWARD_BLOCK).max(frame_size);

        loop {
            if stop.is_cancelled() {
                return Ok(());
            }

            let (returned, mut chunk) = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; block];
                let n = read_full(&mut reader, &mut buf)?;
                buf.truncate(n);
                Ok::<_, std::io::Error>((reader, buf))
            })
            .await
            .map_err(|e| ProducerError::Worker(format!("read task failed: {e}")))??;
            reader = returned;

            let at_eof = chunk.len() < block;
            let partial = chunk.len() % frame_size;
            if partial > 0 {
                tracing::debug!(bytes = partial, "dropping trailing partial frame");
                chunk.truncate(chunk.len() - partial);
            }

            if !chunk.is_empty() {
                if let Step::Stopped = self.send(Arc::new(chunk), stop).await? {
                    return Ok(());
                }
            }

            if at_eof {
                tracing::debug!(bytes = self.stats.bytes_sent, "forward input exhausted");
                return self.drain(stop).await;
            }
        }
    }

    /// Writes `data` on the blocking pool, closing the channel if `stop` fires first.
    async fn send(
        &mut self,
        data: Arc<Vec<u8>>,
        stop: &CancellationToken,
    ) -> Result<Step<usize>, ProducerError> {
        let writer = Arc::clone(&self.writer);
        let mut task = tokio::task::spawn_blocking(move || writer.write(&data));

        tokio::select! {
            result = &mut task => {
                let written = result
                    .map_err(|e| ProducerError::Worker(format!("write task failed: {e}")))??;
                self.record_write(written);
                Ok(Step::Done(written))
            }
            () = stop.cancelled() => {
                self.writer.close();
                // The close wakes a pending write with ChannelClosed; one that
                // finished first still counts
                if let Ok(Ok(written)) = task.await {
                    self.record_write(written);
                }
                Ok(Step::Stopped)
            }
        }
    }

    fn record_write(&mut self, written: usize) {
        self.stats.bytes_sent += written as u64;
        self.stats.writes += 1;
    }

    /// Waits until the consumer has read everything queued.
    async fn drain(&mut self, stop: &CancellationToken) -> Result<(), ProducerError> {
        let writer = Arc::clone(&self.writer);
        let mut task = tokio::task::spawn_blocking(move || writer.flush());

        tokio::select! {
            result = &mut task => {
                result.map_err(|e| ProducerError::Worker(format!("flush task failed: {e}")))??;
                Ok(())
            }
            () = stop.cancelled() => {
                self.writer.close();
                let _ = task.await;
                Ok(())
            }
        }
    }
}

async fn pause(duration: Duration, stop: &CancellationToken) -> Step<()> {
    if duration.is_zero() {
        return Step::Done(());
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => Step::Done(()),
        () = stop.cancelled() => Step::Stopped,
    }
}

/// Reads until `buf` is full or the reader hits EOF.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockingMode;
    use crate::ChannelError;
    use std::io::Cursor;

    fn short_pattern() -> TestPattern {
        TestPattern::new(vec![
            Segment::Tone {
                frequency: 440.0,
                duration: Duration::from_millis(10),
                pause: Duration::from_millis(1),
            },
            Segment::Silence {
                duration: Duration::from_millis(10),
                pause: Duration::from_millis(1),
            },
        ])
    }

    #[test]
    fn test_create_rejects_second_producer() {
        let registry = ChannelRegistry::new();
        let _first = PipeProducer::create(
            &registry,
            0,
            AudioFormat::PIPE_DEFAULT,
            ChannelConfig::default(),
        )
        .unwrap();
        let err = PipeProducer::create(
            &registry,
            0,
            AudioFormat::PIPE_DEFAULT,
            ChannelConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VirtualMicError::AlreadyOpen { .. }));
    }

    #[test]
    fn test_create_rejects_capacity_below_one_frame() {
        let registry = ChannelRegistry::new();
        let config = ChannelConfig {
            capacity_bytes: 3,
            ..ChannelConfig::default()
        };
        let err = PipeProducer::create(&registry, 0, AudioFormat::PIPE_DEFAULT, config)
            .unwrap_err();
        assert!(matches!(err, VirtualMicError::InvalidConfig { .. }));
        assert!(!registry.contains(&pipe_name(0)));
    }

    #[tokio::test]
    async fn test_stop_counts_write_that_completed() {
        for _ in 0..20 {
            let registry = ChannelRegistry::new();
            let mut producer = PipeProducer::create(
                &registry,
                0,
                AudioFormat::PIPE_DEFAULT,
                ChannelConfig::default(),
            )
            .unwrap();
            let writer = Arc::clone(&producer.writer);

            let stop = CancellationToken::new();
            stop.cancel();
            // Whichever branch wins, accepted bytes must show up in the stats
            let _ = producer.send(Arc::new(vec![0u8; 1764]), &stop).await.unwrap();

            assert_eq!(producer.stats.bytes_sent, writer.stats().bytes_written);
            assert_eq!(producer.stats.writes, u64::from(producer.stats.bytes_sent > 0));
        }
    }

    #[tokio::test]
    async fn test_unrenderable_segment_is_render_error() {
        let registry = ChannelRegistry::new();
        let producer = PipeProducer::create(
            &registry,
            0,
            AudioFormat::PIPE_DEFAULT,
            ChannelConfig::default(),
        )
        .unwrap();

        let pattern = TestPattern::new(vec![Segment::Tone {
            frequency: f64::NAN,
            duration: Duration::from_millis(10),
            pause: Duration::ZERO,
        }]);
        let err = producer
            .run(ProducerInput::Pattern(pattern), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProducerError::Render(VirtualMicError::InvalidTone { .. })
        ));
        assert!(!registry.contains(&pipe_name(0)));
    }

    #[test]
    fn test_read_full_stops_at_eof() {
        let mut reader = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stop_closes_channel() {
        let registry = ChannelRegistry::new();
        let producer = PipeProducer::create(
            &registry,
            0,
            AudioFormat::PIPE_DEFAULT,
            ChannelConfig::default(),
        )
        .unwrap();
        let mut reader = registry.open(pipe_name(0)).unwrap();

        let stop = CancellationToken::new();
        let handle = tokio::spawn(producer.run(ProducerInput::Pattern(short_pattern()), stop.clone()));

        // Nobody drains, so the producer soon blocks on a full channel
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.bytes_sent > 0);
        assert!(!registry.contains(&pipe_name(0)));

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf), Err(ChannelError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_pattern_cycles_while_drained() {
        let registry = ChannelRegistry::new();
        let producer = PipeProducer::create(
            &registry,
            0,
            AudioFormat::PIPE_DEFAULT,
            ChannelConfig::default(),
        )
        .unwrap();
        let mut reader = registry.open(pipe_name(0)).unwrap();

        let drain = std::thread::spawn(move || {
            let mut buf = [0u8; 1764];
            let mut total = 0usize;
            while let Ok(n) = reader.read(&mut buf) {
                total += n;
                std::thread::sleep(Duration::from_millis(1));
            }
            total
        });

        let stop = CancellationToken::new();
        let handle = tokio::spawn(producer.run(ProducerInput::Pattern(short_pattern()), stop.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.cycles >= 1);
        assert!(stats.writes >= 2);
        assert!(drain.join().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_forward_drops_partial_frame() {
        let registry = ChannelRegistry::new();
        let producer = PipeProducer::create(
            &registry,
            0,
            AudioFormat::PIPE_DEFAULT,
            ChannelConfig::default(),
        )
        .unwrap();
        let mut reader = registry.open(pipe_name(0)).unwrap();

        let drain = std::thread::spawn(move || {
            let mut received = Vec::new();
            let mut buf = [0u8; 64];
            while let Ok(n) = reader.read(&mut buf) {
                received.extend_from_slice(&buf[..n]);
                std::thread::sleep(Duration::from_millis(1));
            }
            received
        });

        let input: Vec<u8> = (0..10).collect();
        let stats = producer
            .run(
                ProducerInput::Forward(Box::new(Cursor::new(input))),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(stats.bytes_sent, 8);
        assert_eq!(drain.join().unwrap(), (0..8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_nonblocking_overflow_is_transport_error() {
        let registry = ChannelRegistry::new();
        let config = ChannelConfig {
            capacity_bytes: 64,
            blocking: BlockingMode::NonBlocking,
            write_timeout: None,
        };
        let producer =
            PipeProducer::create(&registry, 0, AudioFormat::PIPE_DEFAULT, config).unwrap();

        let err = producer
            .run(
                ProducerInput::Pattern(short_pattern()),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProducerError::Transport(ChannelError::TooLarge { .. })
        ));
        assert!(!registry.contains(&pipe_name(0)));
    }
}
