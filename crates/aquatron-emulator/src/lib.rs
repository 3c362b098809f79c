//! Aquatron instrument emulator.
//!
//! [`Instrument`] models the firmware's request/response behavior;
//! [`EmulatorServer`] exposes it on a TCP port so the host link can be
//! exercised end to end without hardware.

pub mod instrument;
pub mod server;

pub use instrument::{Instrument, InstrumentBuilder, InstrumentState};
pub use server::EmulatorServer;
