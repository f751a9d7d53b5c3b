//! Endpoint wiring of the virtual device.
//!
//! Each endpoint pairs a topology filter with a wave filter and lists the
//! formats its pin accepts. The table is plain data, built once at startup and
//! passed by reference to whatever needs it:
//!
//! ```text
//!              +------+    +------+
//!              | Topo |    | Wave |
//!  Mic in  --->|0    1|===>|0    1|---> Capture host pin
//!              +------+    +------+
//! ```

use crate::{AudioFormat, VirtualMicError};

/// Direction of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// A microphone-style endpoint fed by the tone or a producer channel.
    Capture,
    /// A speaker-style endpoint.
    Render,
}

/// One topology/wave filter pair and the formats its pin supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Capture or render.
    pub kind: EndpointKind,
    /// Input pin index; also selects the producer channel name.
    pub pin: u32,
    /// Name of the topology filter.
    pub topology_name: String,
    /// Name of the wave filter.
    pub wave_name: String,
    /// Largest channel count the pin accepts.
    pub max_channels: u16,
    /// Formats the pin accepts, in order of preference.
    pub formats: Vec<AudioFormat>,
}

impl EndpointDescriptor {
    /// The front microphone array endpoint.
    ///
    /// Filter names count from 1 (`pin` 0 is `TopologyMicArray1`); the index
    /// saturates at `u32::MAX`.
    pub fn mic_array(pin: u32) -> Self {
        let index = pin.saturating_add(1);
        Self {
            kind: EndpointKind::Capture,
            pin,
            topology_name: format!("TopologyMicArray{index}"),
            wave_name: format!("WaveMicArray{index}"),
            max_channels: 2,
            formats: vec![
                AudioFormat::new(2, 16, 44100),
                AudioFormat::new(2, 16, 48000),
                AudioFormat::new(1, 16, 48000),
                AudioFormat::new(2, 24, 48000),
            ],
        }
    }

    /// Returns `true` if the pin accepts `format`.
    pub fn supports(&self, format: &AudioFormat) -> bool {
        self.formats.contains(format)
    }

    /// The first listed format, used when the caller has no preference.
    pub fn preferred_format(&self) -> Option<AudioFormat> {
        self.formats.first().copied()
    }
}

/// All endpoints of the virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Endpoint descriptors in registration order.
    pub endpoints: Vec<EndpointDescriptor>,
}

impl Topology {
    /// Creates a topology from explicit endpoints.
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Self {
        Self { endpoints }
    }

    /// Number of render endpoints.
    pub fn speaker_count(&self) -> u32 {
        self.count(EndpointKind::Render)
    }

    /// Number of capture endpoints.
    pub fn mic_count(&self) -> u32 {
        self.count(EndpointKind::Capture)
    }

    /// Total filters to register: a topology and a wave filter per endpoint.
    pub fn max_miniports(&self) -> usize {
        self.endpoints.len() * 2
    }

    /// The capture endpoint for `pin`, if any.
    pub fn endpoint(&self, pin: u32) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|e| e.kind == EndpointKind::Capture && e.pin == pin)
    }

    /// Accepts `format` for the capture pin `pin`.
    ///
    /// # Errors
    ///
    /// - [`VirtualMicError::UnknownPin`] if no capture endpoint has this pin
    /// - [`VirtualMicError::InvalidFormat`] if the format is malformed or the
    ///   pin does not list it
    pub fn negotiate(&self, pin: u32, format: AudioFormat) -> Result<AudioFormat, VirtualMicError> {
        let endpoint = self
            .endpoint(pin)
            .ok_or(VirtualMicError::UnknownPin { pin })?;
        format.validate()?;

        if !endpoint.supports(&format) {
            return Err(VirtualMicError::invalid_format(format!(
                "{format} not supported by {}",
                endpoint.wave_name
            )));
        }
        Ok(format)
    }

    fn count(&self, kind: EndpointKind) -> u32 {
        self.endpoints.iter().filter(|e| e.kind == kind).count() as u32
    }
}

impl Default for Topology {
    /// A single capture endpoint on pin 0.
    fn default() -> Self {
        Self::new(vec![EndpointDescriptor::mic_array(0)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topology() {
        let topology = Topology::default();
        assert_eq!(topology.mic_count(), 1);
        assert_eq!(topology.speaker_count(), 0);
        assert_eq!(topology.max_miniports(), 2);

        let endpoint = topology.endpoint(0).unwrap();
        assert_eq!(endpoint.topology_name, "TopologyMicArray1");
        assert_eq!(endpoint.wave_name, "WaveMicArray1");
        assert_eq!(endpoint.preferred_format(), Some(AudioFormat::PIPE_DEFAULT));
    }

    #[test]
    fn test_negotiate_supported() {
        let topology = Topology::default();
        let format = AudioFormat::new(1, 16, 48000);
        assert_eq!(topology.negotiate(0, format), Ok(format));
    }

    #[test]
    fn test_negotiate_unsupported() {
        let topology = Topology::default();
        let err = topology
            .negotiate(0, AudioFormat::new(1, 8, 8000))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid format: 1ch/8-bit/8000Hz not supported by WaveMicArray1"
        );
    }

    #[test]
    fn test_negotiate_unknown_pin() {
        let topology = Topology::default();
        assert_eq!(
            topology.negotiate(3, AudioFormat::PIPE_DEFAULT),
            Err(VirtualMicError::UnknownPin { pin: 3 })
        );
    }

    #[test]
    fn test_mic_array_highest_pin() {
        let endpoint = EndpointDescriptor::mic_array(u32::MAX);
        assert_eq!(endpoint.pin, u32::MAX);
        assert_eq!(endpoint.wave_name, format!("WaveMicArray{}", u32::MAX));

        let topology = Topology::new(vec![endpoint]);
        assert_eq!(
            topology.negotiate(u32::MAX, AudioFormat::PIPE_DEFAULT),
            Ok(AudioFormat::PIPE_DEFAULT)
        );
    }

    #[test]
    fn test_render_endpoints_counted_separately() {
        let mut speaker = EndpointDescriptor::mic_array(0);
        speaker.kind = EndpointKind::Render;
        let topology = Topology::new(vec![
            EndpointDescriptor::mic_array(0),
            EndpointDescriptor::mic_array(1),
            speaker,
        ]);

        assert_eq!(topology.mic_count(), 2);
        assert_eq!(topology.speaker_count(), 1);
        assert_eq!(topology.max_miniports(), 6);
        assert_eq!(topology.endpoint(1).unwrap().wave_name, "WaveMicArray2");
    }
}
