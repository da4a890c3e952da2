//! Transport implementations for the EV3 UART link
//!
//! - [`io::IoTransport`]: any `embedded-io` serial port plus a bit rate
//!   hook
//! - [`sim`]: an in-memory sensor line with timer and delay stand-ins,
//!   used to exercise the engine off-target

#![no_std]
#![deny(unsafe_code)]

pub mod io;
pub mod sim;

pub use io::{IoError, IoKeepalive, IoTransport};
pub use sim::{SimDelay, SimError, SimLink, SimTimer};
