//! Serial byte transport abstractions
//!
//! The EV3 sensor port is a plain 8N1 UART whose bit rate changes once per
//! session, after the handshake.

/// Bit rate every EV3 UART sensor starts its handshake at
pub const DEFAULT_BIT_RATE: u32 = 2400;

/// Duplex byte channel
///
/// Implementations are expected to buffer received bytes so that
/// [`is_byte_available`](ByteTransport::is_byte_available) can be polled
/// without losing data.
pub trait ByteTransport {
    /// Error type for transport operations
    type Error: core::fmt::Debug;

    /// Check whether at least one received byte is waiting
    fn is_byte_available(&mut self) -> bool;

    /// Read one received byte
    ///
    /// Only called after [`is_byte_available`](ByteTransport::is_byte_available)
    /// returned true, so implementations may block briefly.
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Write one byte to the sensor
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Reconfigure the line to a new bit rate
    fn set_bit_rate(&mut self, bit_rate: u32) -> Result<(), Self::Error>;

    /// Write a sequence of bytes
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Discard every byte currently buffered on the receive side
    ///
    /// Returns the number of bytes dropped.
    fn drain(&mut self) -> Result<usize, Self::Error> {
        let mut dropped = 0;
        while self.is_byte_available() {
            self.read_byte()?;
            dropped += 1;
        }
        Ok(dropped)
    }
}

/// Transmit-only handle used by the heartbeat
///
/// The heartbeat runs from a timer context and must never touch the
/// receive side of the link, so it gets its own narrow sink.
pub trait KeepaliveSink {
    /// Error type for transmit operations
    type Error: core::fmt::Debug;

    /// Write one byte to the sensor
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
}
