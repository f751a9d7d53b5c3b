//! Reference producer for the virtual microphone.
//!
//! Creates the channel for one input pin and streams the test pattern into it
//! until Ctrl-C. The channel is in-process, so a loopback capture stream drains
//! it on a 10 ms period and logs what the capture side sees.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use virtual_mic::{
    event_callback, AudioFormat, BridgeEvent, CaptureStream, ChannelConfig, ChannelRegistry,
    DeviceState, EndpointDescriptor, PipeProducer, ProducerInput, TestPattern, ToneParams, Topology,
};

/// Capture fill period of the loopback monitor.
const FILL_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Parser)]
#[command(
    name = "vmic-producer",
    version,
    about = "Streams a test pattern into a virtual microphone input pin"
)]
struct Cli {
    /// Input pin index (default 0; negative or invalid values fall back to 0)
    #[arg(allow_negative_numbers = true)]
    pin: Option<String>,

    /// Send the extended pattern with white noise and a frequency sweep
    #[arg(long)]
    extended: bool,
}

impl Cli {
    fn pattern(&self) -> TestPattern {
        if self.extended {
            TestPattern::extended()
        } else {
            TestPattern::reference()
        }
    }
}

/// Parses the pin argument, warning and falling back to 0 when unusable.
fn resolve_pin(arg: Option<&str>) -> u32 {
    let Some(raw) = arg else {
        return 0;
    };
    match raw.parse::<i64>() {
        Ok(pin) if pin < 0 => {
            tracing::warn!(pin, "negative pin index, using 0");
            0
        }
        Ok(pin) => u32::try_from(pin).unwrap_or_else(|_| {
            tracing::warn!(pin, "pin index out of range, using 0");
            0
        }),
        Err(_) => {
            tracing::warn!(arg = raw, "pin index is not a number, using 0");
            0
        }
    }
}

fn log_event(event: BridgeEvent) {
    match event {
        BridgeEvent::ProducerAttached { channel } => {
            tracing::info!(%channel, "loopback attached");
        }
        BridgeEvent::ProducerDetached { channel, reason } => {
            tracing::info!(%channel, %reason, "loopback detached");
        }
        BridgeEvent::UnderrunStarted {
            channel,
            missing_bytes,
        } => {
            tracing::warn!(%channel, missing_bytes, "loopback underrun");
        }
        BridgeEvent::UnderrunEnded {
            channel,
            padded_bytes,
        } => {
            tracing::info!(%channel, padded_bytes, "loopback recovered");
        }
    }
}

/// Drains the pin on a fixed period until `stop` fires.
async fn run_loopback(mut capture: CaptureStream, stop: CancellationToken) {
    let mut period = vec![0u8; capture.format().bytes_for(FILL_PERIOD)];
    let mut ticker = tokio::time::interval(FILL_PERIOD);
    capture.start();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                capture.fill(&mut period);
            }
            () = stop.cancelled() => break,
        }
    }

    capture.stop();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Windows-style help flag, which clap does not know about
    if std::env::args().skip(1).any(|arg| arg == "/?") {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pin = resolve_pin(cli.pin.as_deref());
    let format = AudioFormat::PIPE_DEFAULT;
    let registry = ChannelRegistry::new();

    let producer = match PipeProducer::create(&registry, pin, format, ChannelConfig::default()) {
        Ok(producer) => producer,
        Err(e) => {
            tracing::error!(pin, error = %e, "failed to create channel");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(channel = %producer.writer().name(), "connected, sending test pattern");

    let capture = match CaptureStream::new(
        registry.clone(),
        &Topology::new(vec![EndpointDescriptor::mic_array(pin)]),
        pin,
        format,
        ToneParams::default(),
        Arc::new(DeviceState::new()),
    ) {
        Ok(capture) => capture.with_event_callback(event_callback(log_event)),
        Err(e) => {
            tracing::error!(pin, error = %e, "failed to create loopback capture");
            return ExitCode::FAILURE;
        }
    };

    let stop = CancellationToken::new();
    let loopback = tokio::spawn(run_loopback(capture, stop.clone()));

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupted, closing channel");
                signal_stop.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let result = producer
        .run(ProducerInput::Pattern(cli.pattern()), stop.clone())
        .await;
    stop.cancel();
    let _ = loopback.await;

    match result {
        Ok(stats) => {
            tracing::info!(
                bytes = stats.bytes_sent,
                cycles = stats.cycles,
                "producer exited"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "producer aborted");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pin() {
        assert_eq!(resolve_pin(None), 0);
        assert_eq!(resolve_pin(Some("3")), 3);
        assert_eq!(resolve_pin(Some("-2")), 0);
        assert_eq!(resolve_pin(Some("mic")), 0);
        assert_eq!(resolve_pin(Some("99999999999")), 0);
    }

    #[test]
    fn test_highest_pin_builds_loopback_topology() {
        let pin = resolve_pin(Some("4294967295"));
        assert_eq!(pin, u32::MAX);

        let topology = Topology::new(vec![EndpointDescriptor::mic_array(pin)]);
        assert_eq!(topology.mic_count(), 1);
        assert!(topology.endpoint(pin).is_some());
    }

    #[test]
    fn test_cli_accepts_negative_pin() {
        let cli = Cli::try_parse_from(["vmic-producer", "-1"]).unwrap();
        assert_eq!(cli.pin.as_deref(), Some("-1"));
    }

    #[test]
    fn test_cli_pattern_selection() {
        let cli = Cli::try_parse_from(["vmic-producer", "2"]).unwrap();
        assert_eq!(cli.pattern(), TestPattern::reference());

        let cli = Cli::try_parse_from(["vmic-producer", "--extended", "2"]).unwrap();
        assert_eq!(cli.pin.as_deref(), Some("2"));
        assert_eq!(cli.pattern(), TestPattern::extended());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
