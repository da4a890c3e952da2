//! Periodic timer abstraction
//!
//! The heartbeat is driven by a timer owned by the board (hardware ticker,
//! RTOS timer, async task). The engine only arms and disarms it.

/// Scheduler that invokes the heartbeat callback at a fixed period
pub trait HeartbeatTimer {
    /// Start invoking the callback every `period_us` microseconds
    ///
    /// Arming an already armed timer replaces its period.
    fn arm(&mut self, period_us: u32);

    /// Stop invoking the callback
    ///
    /// Must be safe to call when not armed.
    fn disarm(&mut self);
}

/// Timer for setups where the caller drives the heartbeat by hand
impl HeartbeatTimer for () {
    fn arm(&mut self, _period_us: u32) {}

    fn disarm(&mut self) {}
}
