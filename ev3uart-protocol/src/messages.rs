//! Message types for the EV3 UART protocol
//!
//! Messages are divided by direction:
//! - Host → Sensor: acknowledgements, keepalive, mode select, raw write
//! - Sensor → Host: handshake metadata and measurement data
//!
//! The host side only ever encodes [`HostCommand`]. [`SensorMessage`]
//! encoding exists for simulation and testing.

use heapless::Vec;

use crate::frame::{
    Frame, FrameError, BYTE_ACK, BYTE_NACK, BYTE_SYNC, CMD_DATA, CMD_INFO, CMD_MMM_MASK,
    CMD_MODES, CMD_SELECT, CMD_SPEED, CMD_TYPE, CMD_WRITE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
use crate::info::{DataType, InfoKind};

/// Messages from the host to the sensor
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostCommand<'a> {
    /// Accept the handshake
    Ack,
    /// Keepalive
    Nack,
    /// Switch the sensor to another mode
    Select { mode: u8 },
    /// Raw bytes for the sensor (1-32, padded to a power of two)
    Write(&'a [u8]),
}

impl<'a> HostCommand<'a> {
    /// Encode this command into a frame
    ///
    /// Returns `None` for single-byte system messages.
    pub fn to_frame(&self) -> Result<Option<Frame>, FrameError> {
        match self {
            HostCommand::Ack | HostCommand::Nack => Ok(None),
            HostCommand::Select { mode } => Frame::new(CMD_SELECT, &[*mode]).map(Some),
            HostCommand::Write(bytes) => Frame::with_length(CMD_WRITE, bytes).map(Some),
        }
    }

    /// Encode this command into wire bytes
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        match self {
            HostCommand::Ack => single_byte(BYTE_ACK),
            HostCommand::Nack => single_byte(BYTE_NACK),
            _ => match self.to_frame()? {
                Some(frame) => frame.encode_to_vec(),
                None => Err(FrameError::InvalidLength),
            },
        }
    }
}

/// Messages from the sensor to the host
#[derive(Debug, Clone, PartialEq)]
pub enum SensorMessage<'a> {
    /// Line synchronisation
    Sync,
    /// End of metadata
    Ack,
    /// Negative acknowledge
    Nack,
    /// Sensor type code
    Type(u8),
    /// Highest mode index and number of views
    Modes { modes_minus_one: u8, views: u8 },
    /// Streaming bit rate
    Speed(u32),
    /// Mode name
    Name { mode: u8, name: &'a str },
    /// Unit symbol
    Symbol { mode: u8, symbol: &'a str },
    /// Value range of a mode
    Range {
        mode: u8,
        kind: InfoKind,
        low: f32,
        high: f32,
    },
    /// Sample layout of a mode
    Format {
        mode: u8,
        sets: u8,
        data_type: DataType,
        figures: u8,
        decimals: u8,
    },
    /// Measurement payload
    Data { mode: u8, payload: &'a [u8] },
}

impl<'a> SensorMessage<'a> {
    /// Encode this message into a frame
    ///
    /// Returns `None` for single-byte system messages.
    pub fn to_frame(&self) -> Result<Option<Frame>, FrameError> {
        let frame = match self {
            SensorMessage::Sync | SensorMessage::Ack | SensorMessage::Nack => return Ok(None),
            SensorMessage::Type(sensor_type) => Frame::new(CMD_TYPE, &[*sensor_type])?,
            SensorMessage::Modes {
                modes_minus_one,
                views,
            } => Frame::new(CMD_MODES, &[*modes_minus_one, *views])?,
            SensorMessage::Speed(bit_rate) => Frame::new(CMD_SPEED, &bit_rate.to_le_bytes())?,
            SensorMessage::Name { mode, name } => {
                info_frame(*mode, InfoKind::Name, name.as_bytes())?
            }
            SensorMessage::Symbol { mode, symbol } => {
                info_frame(*mode, InfoKind::Symbol, symbol.as_bytes())?
            }
            SensorMessage::Range {
                mode,
                kind,
                low,
                high,
            } => {
                if !kind.is_range() {
                    return Err(FrameError::InvalidLength);
                }
                let mut payload = [0u8; 8];
                payload[..4].copy_from_slice(&low.to_le_bytes());
                payload[4..].copy_from_slice(&high.to_le_bytes());
                info_frame(*mode, *kind, &payload)?
            }
            SensorMessage::Format {
                mode,
                sets,
                data_type,
                figures,
                decimals,
            } => info_frame(
                *mode,
                InfoKind::Format,
                &[*sets, data_type.code(), *figures, *decimals],
            )?,
            SensorMessage::Data { mode, payload } => {
                Frame::with_length(CMD_DATA | checked_mode(*mode)?, payload)?
            }
        };
        Ok(Some(frame))
    }

    /// Encode this message into wire bytes
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        match self {
            SensorMessage::Sync => single_byte(BYTE_SYNC),
            SensorMessage::Ack => single_byte(BYTE_ACK),
            SensorMessage::Nack => single_byte(BYTE_NACK),
            _ => match self.to_frame()? {
                Some(frame) => frame.encode_to_vec(),
                None => Err(FrameError::InvalidLength),
            },
        }
    }
}

fn checked_mode(mode: u8) -> Result<u8, FrameError> {
    if mode > CMD_MMM_MASK {
        Err(FrameError::InvalidMode)
    } else {
        Ok(mode)
    }
}

fn info_frame(mode: u8, kind: InfoKind, payload: &[u8]) -> Result<Frame, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }
    let mut frame = Frame::with_length(CMD_INFO | checked_mode(mode)?, payload)?;
    frame.info_kind = Some(kind.to_byte());
    Ok(frame)
}

fn single_byte(byte: u8) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
    let mut vec = Vec::new();
    vec.push(byte).map_err(|_| FrameError::BufferTooSmall)?;
    Ok(vec)
}
