//! Transport over an `embedded-io` serial port
//!
//! Most HALs expose their UARTs through `embedded-io`, but changing the
//! bit rate is always HAL specific, so it is supplied as a closure.

use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};

use ev3uart_hal::{ByteTransport, KeepaliveSink};

/// Errors from an [`IoTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError<E> {
    /// The underlying port failed
    Io(E),
    /// A read returned no data
    Eof,
    /// The bit rate hook rejected the requested rate
    BitRate(u32),
}

impl<E: embedded_io::Error> embedded_io::Error for IoError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            IoError::Io(e) => e.kind(),
            IoError::Eof => ErrorKind::Other,
            IoError::BitRate(_) => ErrorKind::InvalidInput,
        }
    }
}

/// [`ByteTransport`] for any readable, writable serial port
///
/// `set_rate` is called with the new bit rate and returns false if the
/// port cannot run at it.
pub struct IoTransport<IO, F> {
    port: IO,
    set_rate: F,
}

impl<IO, F> IoTransport<IO, F>
where
    IO: Read + ReadReady + Write,
    F: FnMut(&mut IO, u32) -> bool,
{
    pub fn new(port: IO, set_rate: F) -> Self {
        Self { port, set_rate }
    }

    /// Borrow the port
    pub fn port(&mut self) -> &mut IO {
        &mut self.port
    }

    /// Give back the port
    pub fn release(self) -> IO {
        self.port
    }
}

impl<IO, F> ByteTransport for IoTransport<IO, F>
where
    IO: Read + ReadReady + Write,
    F: FnMut(&mut IO, u32) -> bool,
{
    type Error = IoError<<IO as ErrorType>::Error>;

    fn is_byte_available(&mut self) -> bool {
        // A port that cannot report readiness has nothing for us
        self.port.read_ready().unwrap_or(false)
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte).map_err(IoError::Io)? {
            0 => Err(IoError::Eof),
            _ => Ok(byte[0]),
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.port.write_all(&[byte]).map_err(IoError::Io)
    }

    fn set_bit_rate(&mut self, bit_rate: u32) -> Result<(), Self::Error> {
        self.port.flush().map_err(IoError::Io)?;
        if (self.set_rate)(&mut self.port, bit_rate) {
            Ok(())
        } else {
            Err(IoError::BitRate(bit_rate))
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.port.write_all(bytes).map_err(IoError::Io)
    }
}

/// Transmit half of a split UART used as the heartbeat sink
pub struct IoKeepalive<W>(pub W);

impl<W: Write> KeepaliveSink for IoKeepalive<W> {
    type Error = W::Error;

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.0.write_all(&[byte])?;
        self.0.flush()
    }
}
