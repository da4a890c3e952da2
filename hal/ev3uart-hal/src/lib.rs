//! EV3 UART Hardware Abstraction Layer
//!
//! This crate defines the narrow hardware surface the sensor link engine
//! consumes. Board support code implements these traits; the engine in
//! `ev3uart-core` is written purely against them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ev3uart-core (link engine, heartbeat)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  ev3uart-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ embedded-io   │       │  simulated    │
//! │   adapter     │       │  sensor link  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`serial::ByteTransport`] - Duplex byte channel with settable bit rate
//! - [`serial::KeepaliveSink`] - Transmit-only handle used by the heartbeat
//! - [`timer::HeartbeatTimer`] - Periodic callback scheduler

#![no_std]
#![deny(unsafe_code)]

pub mod serial;
pub mod timer;

pub use serial::{ByteTransport, KeepaliveSink, DEFAULT_BIT_RATE};
pub use timer::HeartbeatTimer;
