//! Simulated sensor line
//!
//! [`SimLink`] stands in for the UART: tests queue the bytes a sensor
//! would send and inspect what the host wrote back. All handles work
//! through shared references, so the engine and the heartbeat can hold
//! the same link the way they would share one UART on a board.

use core::cell::{Cell, RefCell};

use embedded_hal::delay::DelayNs;
use heapless::{Deque, Vec};

use ev3uart_hal::{ByteTransport, HeartbeatTimer, KeepaliveSink, DEFAULT_BIT_RATE};
use ev3uart_protocol::{FrameError, SensorMessage};

/// Bytes the simulated sensor can have in flight
pub const SIM_RX_CAPACITY: usize = 1024;

/// Bytes the simulated sensor records from the host
pub const SIM_TX_CAPACITY: usize = 512;

/// Errors reported by the simulated line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimError {
    /// The line was put into the faulted state
    Fault,
    /// Read with nothing queued
    Empty,
    /// The host wrote more than the recorder holds
    Overflow,
}

struct Line {
    rx: Deque<u8, SIM_RX_CAPACITY>,
    tx: Vec<u8, SIM_TX_CAPACITY>,
    bit_rate: u32,
    rate_changes: u32,
}

/// In-memory UART with a scripted sensor on the other end
pub struct SimLink {
    line: RefCell<Line>,
    faulted: Cell<bool>,
    write_faulted: Cell<bool>,
    rate_faulted: Cell<bool>,
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLink {
    /// Idle line at the default bit rate
    pub fn new() -> Self {
        Self {
            line: RefCell::new(Line {
                rx: Deque::new(),
                tx: Vec::new(),
                bit_rate: DEFAULT_BIT_RATE,
                rate_changes: 0,
            }),
            faulted: Cell::new(false),
            write_faulted: Cell::new(false),
            rate_faulted: Cell::new(false),
        }
    }

    /// Queue raw bytes from the sensor
    ///
    /// Returns the number queued; bytes past the receive capacity are lost,
    /// like an overrun UART.
    pub fn push_bytes(&self, bytes: &[u8]) -> usize {
        let mut line = self.line.borrow_mut();
        bytes
            .iter()
            .take_while(|&&b| line.rx.push_back(b).is_ok())
            .count()
    }

    /// Queue one encoded sensor message
    pub fn push_message(&self, message: &SensorMessage<'_>) -> Result<(), FrameError> {
        let bytes = message.encode_to_vec()?;
        self.push_bytes(&bytes);
        Ok(())
    }

    /// Bytes queued but not yet read by the host
    pub fn pending(&self) -> usize {
        self.line.borrow().rx.len()
    }

    /// Everything the host has written so far
    pub fn written(&self) -> Vec<u8, SIM_TX_CAPACITY> {
        self.line.borrow().tx.clone()
    }

    /// Return and forget everything the host has written
    pub fn take_written(&self) -> Vec<u8, SIM_TX_CAPACITY> {
        core::mem::take(&mut self.line.borrow_mut().tx)
    }

    /// Current line bit rate
    pub fn bit_rate(&self) -> u32 {
        self.line.borrow().bit_rate
    }

    /// Number of `set_bit_rate` calls
    pub fn rate_changes(&self) -> u32 {
        self.line.borrow().rate_changes
    }

    /// Make every transport call fail until cleared
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.set(faulted);
    }

    /// Make only host writes fail until cleared
    pub fn set_write_faulted(&self, faulted: bool) {
        self.write_faulted.set(faulted);
    }

    /// Make only bit rate changes fail until cleared
    pub fn set_rate_faulted(&self, faulted: bool) {
        self.rate_faulted.set(faulted);
    }

    fn check(&self) -> Result<(), SimError> {
        if self.faulted.get() {
            Err(SimError::Fault)
        } else {
            Ok(())
        }
    }

    fn record(&self, byte: u8) -> Result<(), SimError> {
        self.check()?;
        if self.write_faulted.get() {
            return Err(SimError::Fault);
        }
        self.line
            .borrow_mut()
            .tx
            .push(byte)
            .map_err(|_| SimError::Overflow)
    }
}

impl ByteTransport for &SimLink {
    type Error = SimError;

    fn is_byte_available(&mut self) -> bool {
        !self.faulted.get() && !self.line.borrow().rx.is_empty()
    }

    fn read_byte(&mut self) -> Result<u8, SimError> {
        self.check()?;
        self.line
            .borrow_mut()
            .rx
            .pop_front()
            .ok_or(SimError::Empty)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), SimError> {
        self.record(byte)
    }

    fn set_bit_rate(&mut self, bit_rate: u32) -> Result<(), SimError> {
        self.check()?;
        if self.rate_faulted.get() {
            return Err(SimError::Fault);
        }
        let mut line = self.line.borrow_mut();
        line.bit_rate = bit_rate;
        line.rate_changes += 1;
        Ok(())
    }
}

impl KeepaliveSink for &SimLink {
    type Error = SimError;

    fn write_byte(&mut self, byte: u8) -> Result<(), SimError> {
        self.record(byte)
    }
}

/// Heartbeat timer that only records how it was driven
#[derive(Debug, Default)]
pub struct SimTimer {
    period_us: Cell<Option<u32>>,
    arms: Cell<u32>,
}

impl SimTimer {
    /// Disarmed timer
    pub const fn new() -> Self {
        Self {
            period_us: Cell::new(None),
            arms: Cell::new(0),
        }
    }

    /// Returns true while armed
    pub fn is_armed(&self) -> bool {
        self.period_us.get().is_some()
    }

    /// Armed period in microseconds
    pub fn period_us(&self) -> Option<u32> {
        self.period_us.get()
    }

    /// Number of `arm` calls
    pub fn arm_count(&self) -> u32 {
        self.arms.get()
    }
}

impl HeartbeatTimer for &SimTimer {
    fn arm(&mut self, period_us: u32) {
        self.period_us.set(Some(period_us));
        self.arms.set(self.arms.get() + 1);
    }

    fn disarm(&mut self) {
        self.period_us.set(None);
    }
}

/// Delay that returns immediately and adds up the requested time
#[derive(Debug, Default)]
pub struct SimDelay {
    elapsed_ns: Cell<u64>,
}

impl SimDelay {
    pub const fn new() -> Self {
        Self {
            elapsed_ns: Cell::new(0),
        }
    }

    /// Total requested delay in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.get() / 1_000_000
    }
}

impl DelayNs for &SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + u64::from(ns));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read() {
        let sim = SimLink::new();
        sim.push_message(&SensorMessage::Type(29)).unwrap();
        assert_eq!(sim.pending(), 3);

        let mut t = &sim;
        assert!(t.is_byte_available());
        assert_eq!(t.read_byte(), Ok(0x40));
        assert_eq!(t.read_byte(), Ok(0x1D));
        assert_eq!(t.read_byte(), Ok(0xFF ^ 0x40 ^ 0x1D));
        assert!(!t.is_byte_available());
        assert_eq!(t.read_byte(), Err(SimError::Empty));
    }

    #[test]
    fn test_records_writes_from_both_handles() {
        let sim = SimLink::new();
        let mut transport = &sim;
        let mut sink = &sim;
        ByteTransport::write_byte(&mut transport, 0x04).unwrap();
        KeepaliveSink::write_byte(&mut sink, 0x02).unwrap();
        assert_eq!(&sim.take_written()[..], &[0x04, 0x02]);
        assert!(sim.written().is_empty());
    }

    #[test]
    fn test_fault_blocks_everything() {
        let sim = SimLink::new();
        sim.push_bytes(&[1, 2]);
        sim.set_faulted(true);

        let mut t = &sim;
        assert!(!t.is_byte_available());
        assert_eq!(t.read_byte(), Err(SimError::Fault));
        assert_eq!(t.set_bit_rate(57_600), Err(SimError::Fault));
        assert_eq!(sim.bit_rate(), DEFAULT_BIT_RATE);

        sim.set_faulted(false);
        assert_eq!(t.drain(), Ok(2));
    }

    #[test]
    fn test_rate_fault_leaves_line_alone() {
        let sim = SimLink::new();
        sim.set_rate_faulted(true);
        let mut t = &sim;
        assert_eq!(t.set_bit_rate(57_600), Err(SimError::Fault));
        assert_eq!(sim.bit_rate(), DEFAULT_BIT_RATE);
        ByteTransport::write_byte(&mut t, 0x02).unwrap();
        assert_eq!(&sim.written()[..], &[0x02]);
    }

    #[test]
    fn test_overrun_drops_excess() {
        let sim = SimLink::new();
        let bytes = [0u8; SIM_RX_CAPACITY + 8];
        assert_eq!(sim.push_bytes(&bytes), SIM_RX_CAPACITY);
        assert_eq!(sim.pending(), SIM_RX_CAPACITY);
    }

    #[test]
    fn test_timer_and_delay_bookkeeping() {
        let timer = SimTimer::new();
        let mut t = &timer;
        t.arm(95_000);
        assert_eq!(timer.period_us(), Some(95_000));
        t.disarm();
        assert!(!timer.is_armed());
        assert_eq!(timer.arm_count(), 1);

        let delay = SimDelay::new();
        let mut d = &delay;
        d.delay_ms(10);
        assert_eq!(delay.elapsed_ms(), 10);
    }
}
