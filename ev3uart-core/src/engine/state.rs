//! Connection state and sensor identity

/// Link state
///
/// ```text
///          TYPE ok            ACK
///  Reset ──────────▶ Handshaking ──────▶ Streaming
///    ▲                                      │
///    └──────── reset() / error threshold ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// Waiting for a TYPE message at the default bit rate
    #[default]
    Reset,
    /// Receiving mode metadata
    Handshaking,
    /// Receiving DATA messages at the negotiated bit rate
    Streaming,
}

impl ConnectionState {
    /// Compact encoding used by the shared link flag
    pub const fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Reset => 0,
            ConnectionState::Handshaking => 1,
            ConnectionState::Streaming => 2,
        }
    }

    /// Inverse of [`to_u8`](Self::to_u8); unknown values read as `Reset`
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Handshaking,
            2 => ConnectionState::Streaming,
            _ => ConnectionState::Reset,
        }
    }

    /// Returns true once DATA messages are being processed
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }
}

/// What the sensor told us about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorIdentity {
    /// LEGO type code (29 = color, 30 = ultrasonic, ...)
    pub sensor_type: u8,
    /// Bit rate to switch to after the handshake
    pub bit_rate: u32,
}

impl SensorIdentity {
    /// Identity before any TYPE message, streaming at `bit_rate`
    pub const fn unknown(bit_rate: u32) -> Self {
        Self {
            sensor_type: 0,
            bit_rate,
        }
    }
}
