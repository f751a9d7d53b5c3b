//! Fixed-size control-plane records.
//!
//! Both records are `#[repr(C)]` plain old data so they cross the control
//! boundary as raw bytes with the same layout as the C structures
//! (`ULONG` = `u32`, `BOOLEAN` = `u8`).

use bytemuck::{Pod, Zeroable};

/// Static capability snapshot returned by `GetInfo` (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ControlInfo {
    /// Driver version.
    pub version: u32,
    /// Number of render (speaker) endpoints.
    pub speaker_count: u32,
    /// Number of capture (microphone) endpoints.
    pub mic_count: u32,
    /// Always zero.
    pub reserved: [u32; 5],
}

impl ControlInfo {
    /// Encoded size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a snapshot with zeroed reserved fields.
    pub fn new(version: u32, speaker_count: u32, mic_count: u32) -> Self {
        Self {
            version,
            speaker_count,
            mic_count,
            reserved: [0; 5],
        }
    }

    /// Raw bytes of the record.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a record from the first [`SIZE`](Self::SIZE) bytes of `bytes`.
    ///
    /// Returns `None` if `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..Self::SIZE)
            .map(bytemuck::pod_read_unaligned)
    }
}

/// Live device state returned by `GetStatus` (36 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ControlStatus {
    speaker_active: u8,
    mic_active: u8,
    _pad: [u8; 2],
    /// Negotiated sample rate of the active stream, 0 when idle.
    pub sample_rate: u32,
    /// Always zero.
    pub reserved: [u32; 7],
}

impl ControlStatus {
    /// Encoded size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a status record with zeroed reserved fields.
    pub fn new(speaker_active: bool, mic_active: bool, sample_rate: u32) -> Self {
        Self {
            speaker_active: u8::from(speaker_active),
            mic_active: u8::from(mic_active),
            _pad: [0; 2],
            sample_rate,
            reserved: [0; 7],
        }
    }

    /// Whether a render stream is running.
    pub fn speaker_active(&self) -> bool {
        self.speaker_active != 0
    }

    /// Whether a capture stream is running.
    pub fn mic_active(&self) -> bool {
        self.mic_active != 0
    }

    /// Raw bytes of the record.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a record from the first [`SIZE`](Self::SIZE) bytes of `bytes`.
    ///
    /// Returns `None` if `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..Self::SIZE)
            .map(bytemuck::pod_read_unaligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_match_c_layout() {
        assert_eq!(ControlInfo::SIZE, 32);
        assert_eq!(ControlStatus::SIZE, 36);
    }

    #[test]
    fn test_status_layout() {
        let status = ControlStatus::new(false, true, 48000);
        let bytes = status.as_bytes();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[4..8], &48000u32.to_ne_bytes());
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_info_from_short_buffer() {
        assert!(ControlInfo::from_bytes(&[0u8; 31]).is_none());
    }

    #[test]
    fn test_info_from_bytes() {
        let info = ControlInfo::new(0x0001_0000, 0, 1);
        let parsed = ControlInfo::from_bytes(info.as_bytes()).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.mic_count, 1);
    }
}
