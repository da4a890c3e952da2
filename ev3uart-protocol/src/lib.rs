//! LEGO EV3 UART Sensor Protocol
//!
//! This crate defines the wire format spoken between an EV3 host port and a
//! UART sensor. It only classifies, checksums and encodes bytes; reading
//! from the line and the connection state machine live in `ev3uart-core`.
//!
//! # Frame Overview
//!
//! Every message starts with a command byte. Checksummed messages use:
//! ```text
//! ┌─────────┬───────────┬─────────────┬──────────┐
//! │ COMMAND │ INFO KIND │ PAYLOAD     │ CHECKSUM │
//! │ 1B      │ INFO only │ 1,2,4..32B  │ 1B       │
//! └─────────┴───────────┴─────────────┴──────────┘
//! ```
//!
//! The checksum is `0xFF` XOR every preceding byte of the frame. System
//! messages (SYNC, NACK, ACK) are a single bare byte.
//!
//! Command byte bit layout for DATA, INFO and WRITE:
//! ```text
//!   7  6 │ 5  4  3 │ 2  1  0
//!   kind │ log2(n) │ mode
//! ```

#![no_std]
#![deny(unsafe_code)]

pub mod checksum;
pub mod frame;
pub mod info;
pub mod messages;

pub use checksum::{
    checksum, is_checksum_exempt, verify, verify_frame, Checksum, COLOR_RGB_RAW_MODE, TYPE_COLOR,
};
pub use frame::{Command, Frame, FrameError, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use info::{DataType, InfoKind};
pub use messages::{HostCommand, SensorMessage};
