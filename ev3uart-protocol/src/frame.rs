//! Command byte classification and frame encoding
//!
//! Frame format:
//! - COMMAND (1 byte): message kind, payload length exponent, mode
//! - INFO KIND (1 byte): INFO messages only
//! - PAYLOAD (0-32 bytes): length given by the command byte
//! - CHECKSUM (1 byte): 0xFF XOR all preceding bytes
//!
//! Classification is pure; reading the payload off the line is the job of
//! the link engine.

use heapless::Vec;

use crate::checksum::Checksum;

// System messages (single byte, no checksum)
pub const BYTE_SYNC: u8 = 0x00;
pub const BYTE_NACK: u8 = 0x02;
pub const BYTE_ACK: u8 = 0x04;

// Fixed-shape commands, matched exactly
pub const CMD_TYPE: u8 = 0x40;
pub const CMD_SELECT: u8 = 0x43;
pub const CMD_WRITE: u8 = 0x44;
pub const CMD_MODES: u8 = 0x49;
pub const CMD_SPEED: u8 = 0x52;

// Message family bits
pub const CMD_MASK: u8 = 0xC0;
pub const CMD_INFO: u8 = 0x80;
pub const CMD_DATA: u8 = 0xC0;

// Length and mode bit fields
pub const CMD_LLL_MASK: u8 = 0x38;
pub const CMD_LLL_SHIFT: u8 = 3;
pub const CMD_MMM_MASK: u8 = 0x07;

/// Mask selecting the WRITE command bits once the length field is removed
const CMD_WRITE_MASK: u8 = !CMD_LLL_MASK;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 32;

/// Maximum complete frame size (COMMAND + INFO KIND + MAX_PAYLOAD + CHECKSUM)
pub const MAX_FRAME_SIZE: usize = 1 + 1 + MAX_PAYLOAD_SIZE + 1;

/// Errors that can occur while encoding frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Payload length cannot be expressed in the command byte
    InvalidLength,
    /// Mode index does not fit the command byte
    InvalidMode,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// Payload length declared by a command byte
///
/// Exponents 6 and 7 are undefined by the protocol and yield 0.
pub const fn payload_length(command: u8) -> usize {
    match (command & CMD_LLL_MASK) >> CMD_LLL_SHIFT {
        exp @ 0..=5 => 1 << exp,
        _ => 0,
    }
}

/// Length exponent for a payload size that is an exact power of two
pub const fn length_exponent(len: usize) -> Option<u8> {
    match len {
        1 => Some(0),
        2 => Some(1),
        4 => Some(2),
        8 => Some(3),
        16 => Some(4),
        32 => Some(5),
        _ => None,
    }
}

/// Smallest encodable payload size that fits `len` bytes
pub const fn padded_length(len: usize) -> Option<usize> {
    if len == 0 || len > MAX_PAYLOAD_SIZE {
        None
    } else {
        Some(len.next_power_of_two())
    }
}

/// Mode index carried in the low bits of DATA and INFO commands
pub const fn mode_bits(command: u8) -> u8 {
    command & CMD_MMM_MASK
}

/// A classified command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Line synchronisation byte
    Sync,
    /// Negative acknowledge, doubles as the host keepalive
    Nack,
    /// End of metadata (sensor) or acceptance (host)
    Ack,
    /// Sensor type, 1 byte
    Type,
    /// Mode count minus one and view count, 2 bytes
    Modes,
    /// Streaming bit rate, 4 bytes little-endian
    Speed,
    /// Mode select, 1 byte
    Select,
    /// Raw write to the sensor
    Write { length: usize },
    /// Mode metadata, followed by an INFO kind byte
    Info { mode: u8, length: usize },
    /// Measurement
    Data { mode: u8, length: usize },
    /// Anything else
    Unknown(u8),
}

impl Command {
    /// Classify a command byte
    pub fn classify(byte: u8) -> Self {
        match byte {
            BYTE_SYNC => Command::Sync,
            BYTE_NACK => Command::Nack,
            BYTE_ACK => Command::Ack,
            CMD_TYPE => Command::Type,
            CMD_MODES => Command::Modes,
            CMD_SPEED => Command::Speed,
            CMD_SELECT => Command::Select,
            b if b & CMD_WRITE_MASK == CMD_WRITE => Command::Write {
                length: payload_length(b),
            },
            b if b & CMD_MASK == CMD_DATA => Command::Data {
                mode: mode_bits(b),
                length: payload_length(b),
            },
            b if b & CMD_MASK == CMD_INFO => Command::Info {
                mode: mode_bits(b),
                length: payload_length(b),
            },
            b => Command::Unknown(b),
        }
    }

    /// Number of payload bytes following the command (and INFO kind byte)
    pub fn payload_len(&self) -> usize {
        match self {
            Command::Type | Command::Select => 1,
            Command::Modes => 2,
            Command::Speed => 4,
            Command::Write { length }
            | Command::Info { length, .. }
            | Command::Data { length, .. } => *length,
            Command::Sync | Command::Nack | Command::Ack | Command::Unknown(_) => 0,
        }
    }
}

/// A checksummed frame ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte
    pub command: u8,
    /// INFO kind byte, present only for INFO frames
    pub info_kind: Option<u8>,
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a frame with an explicit command byte
    pub fn new(command: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let mut payload_vec = Vec::new();
        payload_vec
            .extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        Ok(Self {
            command,
            info_kind: None,
            payload: payload_vec,
        })
    }

    /// Create a frame whose command byte carries the payload length
    ///
    /// The payload is zero-padded to the next power of two.
    pub fn with_length(base: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }
        let padded = padded_length(payload.len()).ok_or(FrameError::InvalidLength)?;
        let exp = length_exponent(padded).ok_or(FrameError::InvalidLength)?;

        let mut frame = Self::new(base | (exp << CMD_LLL_SHIFT), payload)?;
        frame
            .payload
            .resize(padded, 0)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(frame)
    }

    /// Checksum over everything before the trailing byte
    pub fn checksum(&self) -> u8 {
        let mut sum = Checksum::new();
        sum.push(self.command);
        if let Some(kind) = self.info_kind {
            sum.push(kind);
        }
        sum.extend(&self.payload);
        sum.value()
    }

    /// Size of the encoded frame in bytes
    pub fn encoded_len(&self) -> usize {
        2 + usize::from(self.info_kind.is_some()) + self.payload.len()
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let frame_len = self.encoded_len();
        if buffer.len() < frame_len {
            return Err(FrameError::BufferTooSmall);
        }

        let mut pos = 0;
        buffer[pos] = self.command;
        pos += 1;
        if let Some(kind) = self.info_kind {
            buffer[pos] = kind;
            pos += 1;
        }
        buffer[pos..pos + self.payload.len()].copy_from_slice(&self.payload);
        pos += self.payload.len();
        buffer[pos] = self.checksum();

        Ok(frame_len)
    }

    /// Encode this frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| FrameError::BufferTooSmall)?;
        Ok(vec)
    }
}
