//! Board-agnostic link engine for LEGO EV3 UART sensors
//!
//! This crate contains everything between the raw byte transport and the
//! application:
//!
//! - Connection state machine (reset, handshake, streaming)
//! - Mode catalog built from handshake metadata
//! - Sample decoding for the four EV3 data types
//! - Heartbeat gating and error-recovery policy
//! - Engine configuration
//!
//! The engine is poll-driven: call [`Engine::service`] often, read results
//! between calls. The heartbeat runs from its own timer context and talks to
//! the engine only through a [`LinkFlag`].

#![no_std]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod config;
pub mod engine;
pub mod heartbeat;
pub mod mode;
pub mod sample;

pub use config::{ConfigError, EngineConfig};
pub use engine::{ConnectionState, Engine, Error, LinkStats, SensorIdentity};
pub use heartbeat::{Heartbeat, LinkFlag};
pub use mode::{ModeCatalog, ModeDescriptor, ValueRange, MAX_MODES};
pub use sample::{decode_samples, SampleBuffer, MAX_SAMPLES};

pub use ev3uart_protocol::{DataType, InfoKind};
