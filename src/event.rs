//! Runtime events for monitoring the capture bridge.
//!
//! Events are non-fatal notifications. The capture fill keeps running after an
//! event is emitted; they exist for logging and metrics, not error handling.

use std::sync::Arc;

use crate::channel::ChannelName;

/// Runtime events emitted by a [`CaptureStream`](crate::CaptureStream).
///
/// # Example
///
/// ```
/// use virtual_mic::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::ProducerAttached { channel } => {
///             eprintln!("producer attached on {}", channel);
///         }
///         BridgeEvent::ProducerDetached { channel, reason } => {
///             eprintln!("producer left {}: {}", channel, reason);
///         }
///         BridgeEvent::UnderrunStarted { channel, missing_bytes } => {
///             eprintln!("{} ran dry, {} bytes padded", channel, missing_bytes);
///         }
///         BridgeEvent::UnderrunEnded { channel, padded_bytes } => {
///             eprintln!("{} recovered after {} padded bytes", channel, padded_bytes);
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The capture side attached to a producer channel and now streams its audio.
    ProducerAttached {
        /// Channel that was attached.
        channel: ChannelName,
    },

    /// The producer channel closed; the capture side fell back to the tone.
    ProducerDetached {
        /// Channel that went away.
        channel: ChannelName,
        /// Why the session ended.
        reason: String,
    },

    /// The producer did not keep up and a fill had to be padded with silence.
    ///
    /// Emitted once when the shortfall begins, not on every padded fill.
    UnderrunStarted {
        /// Channel that ran dry.
        channel: ChannelName,
        /// Silence bytes in the fill that started the underrun.
        missing_bytes: usize,
    },

    /// A fill was fully served by the producer again after an underrun.
    UnderrunEnded {
        /// Channel that recovered.
        channel: ChannelName,
        /// Total silence bytes padded during the underrun.
        padded_bytes: u64,
    },
}

/// Callback type for receiving runtime events.
///
/// Called on the thread that runs the capture fill, so it must not block.
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use virtual_mic::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event: BridgeEvent| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
