//! Per-sample PCM encoding.

/// Storage width of one PCM sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleWidth {
    /// 8-bit unsigned, offset-binary (silence = 128).
    U8,
    /// 16-bit signed little-endian.
    S16,
    /// 24-bit signed little-endian, packed in 3 bytes.
    S24,
    /// 32-bit signed little-endian.
    S32,
}

impl SampleWidth {
    /// Maps a bit depth to its encoding, or `None` if unsupported.
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(Self::U8),
            16 => Some(Self::S16),
            24 => Some(Self::S24),
            32 => Some(Self::S32),
            _ => None,
        }
    }

    /// Encoded size in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S24 => 3,
            Self::S32 => 4,
        }
    }

    /// Smallest representable signed value, before any offset-binary bias.
    pub fn min_value(self) -> i64 {
        match self {
            Self::U8 => -128,
            Self::S16 => i64::from(i16::MIN),
            Self::S24 => -(1 << 23),
            Self::S32 => i64::from(i32::MIN),
        }
    }

    /// Largest representable signed value, before any offset-binary bias.
    pub fn max_value(self) -> i64 {
        match self {
            Self::U8 => 127,
            Self::S16 => i64::from(i16::MAX),
            Self::S24 => (1 << 23) - 1,
            Self::S32 => i64::from(i32::MAX),
        }
    }

    /// Rounds `value` half away from zero and clips it to the representable range.
    #[inline]
    pub fn quantize(self, value: f64) -> i64 {
        let clipped = value
            .round()
            .clamp(self.min_value() as f64, self.max_value() as f64);
        clipped as i64
    }

    /// Writes an already-quantized sample into `out`, which must be exactly
    /// [`bytes()`](Self::bytes) long.
    #[inline]
    pub fn write(self, sample: i64, out: &mut [u8]) {
        match self {
            Self::U8 => out[0] = (sample + 128) as u8,
            Self::S16 => out.copy_from_slice(&(sample as i16).to_le_bytes()),
            Self::S24 => out.copy_from_slice(&(sample as i32).to_le_bytes()[..3]),
            Self::S32 => out.copy_from_slice(&(sample as i32).to_le_bytes()),
        }
    }

    /// Decodes one sample from `bytes` back to its signed value.
    pub fn read(self, bytes: &[u8]) -> i64 {
        match self {
            Self::U8 => i64::from(bytes[0]) - 128,
            Self::S16 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            Self::S24 => {
                // Sign-extend by placing the 3 bytes in the top of an i32.
                let raw = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]);
                i64::from(raw >> 8)
            }
            Self::S32 => i64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_rounds_half_away_from_zero() {
        assert_eq!(SampleWidth::S16.quantize(0.5), 1);
        assert_eq!(SampleWidth::S16.quantize(-0.5), -1);
        assert_eq!(SampleWidth::S16.quantize(1.49), 1);
    }

    #[test]
    fn test_quantize_clips() {
        assert_eq!(SampleWidth::S16.quantize(40_000.0), 32767);
        assert_eq!(SampleWidth::S16.quantize(-40_000.0), -32768);
        assert_eq!(SampleWidth::U8.quantize(300.0), 127);
        assert_eq!(SampleWidth::S24.quantize(1e9), 8_388_607);
        assert_eq!(SampleWidth::S32.quantize(-1e12), i64::from(i32::MIN));
    }

    #[test]
    fn test_write_u8_offset_binary() {
        let mut out = [0u8; 1];
        SampleWidth::U8.write(0, &mut out);
        assert_eq!(out, [0x80]);
        SampleWidth::U8.write(-128, &mut out);
        assert_eq!(out, [0x00]);
        SampleWidth::U8.write(127, &mut out);
        assert_eq!(out, [0xff]);
    }

    #[test]
    fn test_write_s16_little_endian() {
        let mut out = [0u8; 2];
        SampleWidth::S16.write(16000, &mut out);
        assert_eq!(out, 16000i16.to_le_bytes());
    }

    #[test]
    fn test_s24_sign_extension() {
        let mut out = [0u8; 3];
        SampleWidth::S24.write(-2, &mut out);
        assert_eq!(out, [0xfe, 0xff, 0xff]);
        assert_eq!(SampleWidth::S24.read(&out), -2);

        SampleWidth::S24.write(8_388_607, &mut out);
        assert_eq!(SampleWidth::S24.read(&out), 8_388_607);
    }

    #[test]
    fn test_read_s32() {
        let bytes = (-123_456i32).to_le_bytes();
        assert_eq!(SampleWidth::S32.read(&bytes), -123_456);
    }

    #[test]
    fn test_from_bits() {
        assert_eq!(SampleWidth::from_bits(16), Some(SampleWidth::S16));
        assert_eq!(SampleWidth::from_bits(20), None);
        assert_eq!(SampleWidth::S24.bytes(), 3);
    }
}
