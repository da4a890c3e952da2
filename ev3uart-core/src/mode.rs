//! Mode catalog
//!
//! Sensors describe each of their modes during the handshake with a burst
//! of INFO messages. The catalog holds one descriptor per declared mode in
//! fixed storage; fields fill in as messages arrive, in any order.

use heapless::String;

use ev3uart_protocol::{DataType, InfoKind, MAX_PAYLOAD_SIZE};

use crate::sample::MAX_SAMPLES;

/// Maximum number of modes a sensor may declare
pub const MAX_MODES: usize = 10;

/// Maximum length of a mode name or unit symbol
pub const MAX_TEXT_LEN: usize = MAX_PAYLOAD_SIZE;

/// Reasons an INFO payload could not be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InfoError {
    /// Payload shorter than the INFO kind requires
    Truncated,
    /// FORMAT carried a data type code outside 0..=3
    UnknownDataType(u8),
}

/// Low/high bounds of a value scale
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValueRange {
    pub low: f32,
    pub high: f32,
}

impl ValueRange {
    /// Parse two little-endian floats
    fn from_le_bytes(bytes: &[u8]) -> Result<Self, InfoError> {
        if bytes.len() < 8 {
            return Err(InfoError::Truncated);
        }
        Ok(Self {
            low: le_f32(&bytes[0..4]),
            high: le_f32(&bytes[4..8]),
        })
    }
}

/// Reinterpret four little-endian bytes as an IEEE-754 float
///
/// Callers guarantee at least four bytes.
pub(crate) fn le_f32(bytes: &[u8]) -> f32 {
    f32::from_bits(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Metadata for one sensor mode
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeDescriptor {
    /// Mode name, e.g. "COL-REFLECT"
    pub name: Option<String<MAX_TEXT_LEN>>,
    /// Unit symbol, e.g. "pct"
    pub symbol: String<MAX_TEXT_LEN>,
    /// Samples per DATA message
    pub sets: u8,
    /// Encoding of each sample
    pub data_type: DataType,
    /// Significant figures for display
    pub figures: u8,
    /// Decimal places for display
    pub decimals: u8,
    /// Raw value range
    pub raw: ValueRange,
    /// Percent value range
    pub percent: ValueRange,
    /// SI value range
    pub si: ValueRange,
    format_received: bool,
}

impl Default for ModeDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            symbol: String::new(),
            sets: 1,
            data_type: DataType::Byte8,
            figures: 0,
            decimals: 0,
            raw: ValueRange::default(),
            percent: ValueRange::default(),
            si: ValueRange::default(),
            format_received: false,
        }
    }
}

impl ModeDescriptor {
    /// Name as a string slice, if received
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True once the data format has been received
    pub fn is_complete(&self) -> bool {
        self.format_received
    }

    /// Samples per DATA message, kept within 1 and the sample buffer size
    pub fn sample_count(&self) -> usize {
        usize::from(self.sets).clamp(1, MAX_SAMPLES)
    }

    /// Bytes one DATA payload of this mode occupies
    pub fn payload_size(&self) -> usize {
        self.sample_count() * self.data_type.width()
    }

    /// Fold one INFO payload into the descriptor
    pub fn apply_info(&mut self, kind: InfoKind, payload: &[u8]) -> Result<(), InfoError> {
        match kind {
            InfoKind::Name => self.name = Some(parse_text(payload)),
            InfoKind::Symbol => self.symbol = parse_text(payload),
            InfoKind::RawRange => self.raw = ValueRange::from_le_bytes(payload)?,
            InfoKind::PercentRange => self.percent = ValueRange::from_le_bytes(payload)?,
            InfoKind::SiRange => self.si = ValueRange::from_le_bytes(payload)?,
            InfoKind::Format => {
                if payload.len() < 4 {
                    return Err(InfoError::Truncated);
                }
                let data_type =
                    DataType::from_code(payload[1]).ok_or(InfoError::UnknownDataType(payload[1]))?;
                self.sets = payload[0];
                self.data_type = data_type;
                self.figures = payload[2];
                self.decimals = payload[3];
                self.format_received = true;
            }
        }
        Ok(())
    }
}

/// Read text up to the first NUL or the end of the payload
fn parse_text(bytes: &[u8]) -> String<MAX_TEXT_LEN> {
    let mut text = String::new();
    for &b in bytes.iter().take_while(|&&b| b != 0) {
        if text.push(char::from(b)).is_err() {
            break;
        }
    }
    text
}

/// Fixed-capacity collection of mode descriptors
#[derive(Debug, Clone, Default)]
pub struct ModeCatalog {
    modes: [ModeDescriptor; MAX_MODES],
    count: usize,
    views: u8,
}

impl ModeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every descriptor
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Start a fresh set of `count` empty descriptors
    ///
    /// Counts above [`MAX_MODES`] are clamped.
    pub fn allocate(&mut self, count: usize, views: u8) {
        self.clear();
        self.count = count.min(MAX_MODES);
        self.views = views;
    }

    /// Number of declared modes
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true before a MODES message has been accepted
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of modes the sensor lists for display
    pub fn views(&self) -> u8 {
        self.views
    }

    /// Descriptor for a mode index
    pub fn get(&self, mode: usize) -> Option<&ModeDescriptor> {
        self.modes[..self.count].get(mode)
    }

    /// Mutable descriptor for a mode index
    pub fn get_mut(&mut self, mode: usize) -> Option<&mut ModeDescriptor> {
        self.modes[..self.count].get_mut(mode)
    }

    /// Iterate over declared modes in index order
    pub fn iter(&self) -> impl Iterator<Item = &ModeDescriptor> {
        self.modes[..self.count].iter()
    }

    /// Returns true once every declared mode has its format
    pub fn is_complete(&self) -> bool {
        !self.is_empty() && self.iter().all(ModeDescriptor::is_complete)
    }
}
