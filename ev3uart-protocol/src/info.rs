//! INFO message sub-kinds and the data format codes they carry

// Wire format values
const INFO_NAME: u8 = 0x00;
const INFO_RAW: u8 = 0x01;
const INFO_PCT: u8 = 0x02;
const INFO_SI: u8 = 0x03;
const INFO_SYMBOL: u8 = 0x04;
const INFO_FORMAT: u8 = 0x80;

/// Kind byte following an INFO command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InfoKind {
    /// Mode name, zero-padded text
    Name,
    /// Raw value range, two little-endian f32
    RawRange,
    /// Percent value range, two little-endian f32
    PercentRange,
    /// SI value range, two little-endian f32
    SiRange,
    /// Unit symbol, zero-padded text
    Symbol,
    /// Sample count, data type, figures, decimals
    Format,
}

impl InfoKind {
    /// Parse a kind from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            INFO_NAME => Some(InfoKind::Name),
            INFO_RAW => Some(InfoKind::RawRange),
            INFO_PCT => Some(InfoKind::PercentRange),
            INFO_SI => Some(InfoKind::SiRange),
            INFO_SYMBOL => Some(InfoKind::Symbol),
            INFO_FORMAT => Some(InfoKind::Format),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            InfoKind::Name => INFO_NAME,
            InfoKind::RawRange => INFO_RAW,
            InfoKind::PercentRange => INFO_PCT,
            InfoKind::SiRange => INFO_SI,
            InfoKind::Symbol => INFO_SYMBOL,
            InfoKind::Format => INFO_FORMAT,
        }
    }

    /// Returns true if the payload is a low/high float pair
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            InfoKind::RawRange | InfoKind::PercentRange | InfoKind::SiRange
        )
    }

    /// Short label used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoKind::Name => "Name",
            InfoKind::RawRange => "Raw",
            InfoKind::PercentRange => "Pct",
            InfoKind::SiRange => "Si",
            InfoKind::Symbol => "Symbol",
            InfoKind::Format => "Format",
        }
    }
}

/// Sample encoding declared by a FORMAT message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    /// One signed byte per sample
    #[default]
    Byte8,
    /// Two bytes little-endian, signed
    Int16,
    /// Four bytes little-endian, signed
    Int32,
    /// Four bytes little-endian IEEE-754
    Float32,
}

impl DataType {
    /// Parse a data type from its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DataType::Byte8),
            1 => Some(DataType::Int16),
            2 => Some(DataType::Int32),
            3 => Some(DataType::Float32),
            _ => None,
        }
    }

    /// Wire code of this data type
    pub fn code(self) -> u8 {
        match self {
            DataType::Byte8 => 0,
            DataType::Int16 => 1,
            DataType::Int32 => 2,
            DataType::Float32 => 3,
        }
    }

    /// Bytes occupied by one sample
    pub fn width(self) -> usize {
        match self {
            DataType::Byte8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 | DataType::Float32 => 4,
        }
    }

    /// LEGO firmware name of the data type
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Byte8 => "Data8",
            DataType::Int16 => "Data16",
            DataType::Int32 => "Data32",
            DataType::Float32 => "DataF",
        }
    }
}
