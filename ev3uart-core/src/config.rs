//! Engine configuration
//!
//! Timing and recovery knobs for the link engine. The defaults reproduce
//! the behaviour of the stock EV3 host firmware. The struct can be stored
//! as postcard binary data alongside other board settings.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use ev3uart_hal::DEFAULT_BIT_RATE;

/// Keepalive period actually used on the wire, in microseconds
///
/// The protocol asks for traffic at least every 100 ms; 95 ms leaves
/// margin for timer jitter.
pub const HEARTBEAT_PERIOD_US: u32 = 95_000;

/// Keepalive interval named by the protocol, in milliseconds
pub const PROTOCOL_HEARTBEAT_MS: u32 = 100;

/// Consecutive streaming checksum failures that force a reset
pub const MAX_CONSECUTIVE_ERRORS: u8 = 6;

/// Pause between replying ACK and switching bit rate, in milliseconds
pub const ACK_SETTLE_MS: u32 = 10;

/// Configuration validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Bit rate of zero
    InvalidBitRate,
    /// Heartbeat period of zero, or longer than the protocol allows
    InvalidHeartbeatPeriod,
    /// Error threshold of zero would reset on every frame
    InvalidErrorThreshold,
    /// Buffer too small or data corrupt
    Serialization,
}

/// Link engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Bit rate used for the handshake and after every reset
    pub default_bit_rate: u32,
    /// Keepalive period while streaming (µs)
    pub heartbeat_period_us: u32,
    /// Consecutive checksum failures that trigger an automatic reset
    pub max_consecutive_errors: u8,
    /// Delay between replying ACK and changing bit rate (ms)
    pub ack_settle_ms: u32,
    /// Polls of "byte available" allowed per payload byte, 0 = wait forever
    pub byte_wait_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_bit_rate: DEFAULT_BIT_RATE,
            heartbeat_period_us: HEARTBEAT_PERIOD_US,
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            ack_settle_ms: ACK_SETTLE_MS,
            byte_wait_limit: 0,
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_bit_rate == 0 {
            return Err(ConfigError::InvalidBitRate);
        }
        if self.heartbeat_period_us == 0
            || self.heartbeat_period_us > PROTOCOL_HEARTBEAT_MS * 1000
        {
            return Err(ConfigError::InvalidHeartbeatPeriod);
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::InvalidErrorThreshold);
        }
        Ok(())
    }

    /// Builder-style override of the payload byte wait limit
    pub const fn with_byte_wait_limit(mut self, polls: u32) -> Self {
        self.byte_wait_limit = polls;
        self
    }

    /// Serialize into `buf`, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn to_slice<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Serialization)
    }

    /// Deserialize and validate
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Serialization)?;
        config.validate()?;
        Ok(config)
    }
}
