//! Channel naming.

use std::sync::Arc;

/// Prefix of every producer channel name; the pin index is appended.
pub const PIPE_NAME_PREFIX: &str = r"\\.\pipe\VirtualMicInput_";

/// Name of a producer channel.
///
/// Producer and consumer agree on a channel by name alone, so names for input
/// pins come from one fixed template (see [`pipe_name`]). Cloning is an `Arc`
/// pointer copy.
///
/// # Example
///
/// ```
/// use virtual_mic::{pipe_name, ChannelName};
///
/// assert_eq!(pipe_name(3).as_str(), r"\\.\pipe\VirtualMicInput_3");
/// assert_eq!(pipe_name(0), ChannelName::new(r"\\.\pipe\VirtualMicInput_0"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(Arc<str>);

impl ChannelName {
    /// Creates a channel name from any string.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the pin index if this name follows the pipe template.
    pub fn pin(&self) -> Option<u32> {
        self.0.strip_prefix(PIPE_NAME_PREFIX)?.parse().ok()
    }
}

/// Returns the channel name for input pin `pin`.
pub fn pipe_name(pin: u32) -> ChannelName {
    ChannelName::new(format!("{PIPE_NAME_PREFIX}{pin}"))
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
