//! Sample decoding
//!
//! DATA payloads are packed little-endian values whose width comes from the
//! mode's FORMAT message. Every sample is widened to `f32`.

use ev3uart_protocol::DataType;

use crate::mode::le_f32;

/// Maximum number of values in one sample
pub const MAX_SAMPLES: usize = 10;

/// Decode up to `count` values from `payload` into `out`
///
/// Stops at whichever comes first: `count`, the end of the payload, or the
/// capacity of `out`. Returns the number of values written.
pub fn decode_samples(
    data_type: DataType,
    count: usize,
    payload: &[u8],
    out: &mut [f32; MAX_SAMPLES],
) -> usize {
    let width = data_type.width();
    let mut written = 0;

    for (slot, raw) in out
        .iter_mut()
        .zip(payload.chunks_exact(width))
        .take(count)
    {
        *slot = match data_type {
            DataType::Byte8 => f32::from(raw[0] as i8),
            DataType::Int16 => f32::from(i16::from_le_bytes([raw[0], raw[1]])),
            DataType::Int32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f32,
            DataType::Float32 => le_f32(raw),
        };
        written += 1;
    }

    written
}

/// Most recent accepted measurement
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleBuffer {
    values: [f32; MAX_SAMPLES],
    len: usize,
}

impl SampleBuffer {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self {
            values: [0.0; MAX_SAMPLES],
            len: 0,
        }
    }

    /// Number of decoded values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true before the first accepted DATA message
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Decoded values
    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.len]
    }

    /// Forget the current measurement
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Replace the contents with a freshly decoded payload
    ///
    /// Slots past the decoded values are zeroed so stale readings never
    /// leak into a shorter sample.
    pub fn load(&mut self, data_type: DataType, count: usize, payload: &[u8]) -> usize {
        let mut values = [0.0; MAX_SAMPLES];
        let len = decode_samples(data_type, count, payload, &mut values);
        self.values = values;
        self.len = len;
        len
    }

    /// Copy `count` values into `out[offset..]`
    ///
    /// Copies fewer if `out` is too short. Returns the number copied.
    pub fn fetch(&self, out: &mut [f32], offset: usize, count: usize) -> usize {
        let count = count.min(MAX_SAMPLES);
        let Some(dest) = out.get_mut(offset..) else {
            return 0;
        };
        let n = count.min(dest.len());
        dest[..n].copy_from_slice(&self.values[..n]);
        n
    }
}
