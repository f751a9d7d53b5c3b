//! File forwarding example.
//!
//! Forwards a raw PCM file (16-bit stereo, 44.1 kHz) into pin 0 and drains it
//! through a capture stream, the way a capture host would.
//! Without an argument a two second 440 Hz tone is rendered to a temp file first.
//!
//! Run with: cargo run --example forward_file [-- path/to/audio.pcm]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use virtual_mic::{
    AudioFormat, CaptureStream, ChannelConfig, ChannelRegistry, DeviceState, FillSource,
    PipeProducer, ProducerInput, Segment, ToneParams, Topology, PATTERN_AMPLITUDE,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let format = AudioFormat::PIPE_DEFAULT;

    // Keep the temp file alive until the producer is done with it
    let mut rendered = None;
    let input = match std::env::args().nth(1) {
        Some(path) => {
            println!("Forwarding {path}");
            std::fs::File::open(path)?
        }
        None => {
            let tone = Segment::Tone {
                frequency: 440.0,
                duration: Duration::from_secs(2),
                pause: Duration::ZERO,
            };
            let mut file = tempfile::NamedTempFile::new()?;
            file.write_all(&tone.render(format, PATTERN_AMPLITUDE, 0)?)?;
            file.flush()?;
            println!("Forwarding {} to pin 0", tone.describe());
            let input = file.reopen()?;
            rendered = Some(file);
            input
        }
    };

    let registry = ChannelRegistry::new();
    let producer = PipeProducer::create(&registry, 0, format, ChannelConfig::default())?;

    let mut capture = CaptureStream::new(
        registry.clone(),
        &Topology::default(),
        0,
        format,
        ToneParams::default(),
        Arc::new(DeviceState::new()),
    )?;

    // Drain on a 10 ms period until the producer is finished
    let done = CancellationToken::new();
    let drain_done = done.clone();
    let drain = std::thread::spawn(move || {
        capture.start();
        let mut period = vec![0u8; format.bytes_for(Duration::from_millis(10))];
        let mut producer_fills = 0u32;
        while !drain_done.is_cancelled() {
            if let FillSource::Producer { delivered, .. } = capture.fill(&mut period) {
                if delivered > 0 {
                    producer_fills += 1;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        capture.stop();
        (producer_fills, capture.stats())
    });

    let stats = producer
        .run(ProducerInput::Forward(Box::new(input)), CancellationToken::new())
        .await?;
    done.cancel();
    drop(rendered);

    let (producer_fills, capture_stats) = tokio::task::spawn_blocking(move || drain.join())
        .await?
        .map_err(|_| "capture thread panicked")?;

    println!("Producer: {stats:?}");
    println!("Capture: {producer_fills} fills carried producer audio, {capture_stats:?}");

    Ok(())
}
