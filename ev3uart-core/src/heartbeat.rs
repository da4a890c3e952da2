//! Heartbeat controller
//!
//! An EV3 sensor drops back to its handshake if it hears nothing from the
//! host for about 100 ms. While streaming, a NACK byte is sent on every
//! timer tick. The heartbeat runs from the timer context, so it shares only
//! the [`LinkFlag`] with the engine and writes through its own sink.

use portable_atomic::{AtomicU8, Ordering};

use ev3uart_hal::KeepaliveSink;
use ev3uart_protocol::frame::BYTE_NACK;

use crate::engine::ConnectionState;

/// Connection state published by the engine for the heartbeat
///
/// Written only by the engine, read from any context.
#[derive(Debug, Default)]
pub struct LinkFlag(AtomicU8);

impl LinkFlag {
    /// Create a flag in the `Reset` state
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Publish a new state
    pub fn publish(&self, state: ConnectionState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }

    /// Most recently published state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Returns true while the link is streaming
    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }
}

/// Keepalive sender invoked by the board timer
pub struct Heartbeat<'a, S> {
    link: &'a LinkFlag,
    sink: S,
    sent: u32,
    failures: u32,
}

impl<'a, S: KeepaliveSink> Heartbeat<'a, S> {
    /// Create a heartbeat gated on `link`
    pub fn new(link: &'a LinkFlag, sink: S) -> Self {
        Self {
            link,
            sink,
            sent: 0,
            failures: 0,
        }
    }

    /// Timer callback
    ///
    /// Sends one NACK if the link is streaming. Returns true if a byte was
    /// sent.
    pub fn on_tick(&mut self) -> bool {
        if !self.link.is_streaming() {
            return false;
        }
        match self.sink.write_byte(BYTE_NACK) {
            Ok(()) => {
                self.sent = self.sent.wrapping_add(1);
                true
            }
            Err(_e) => {
                self.failures = self.failures.wrapping_add(1);
                warn!("Heartbeat write failed");
                false
            }
        }
    }

    /// Keepalives sent so far
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Keepalive writes that failed
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Give back the sink
    pub fn release(self) -> S {
        self.sink
    }
}
