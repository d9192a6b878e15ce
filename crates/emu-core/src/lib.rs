//! Core traits shared by the drive, its chips and the serial bus.
//!
//! The instruction-level processor is not part of this workspace. Anything
//! that can execute instructions against a [`Bus`] and exposes the
//! interrupt inputs of a 6502 can drive a 1541 through [`Processor`].

mod bus;
mod observable;
mod processor;

pub use bus::Bus;
pub use observable::{Observable, Value};
pub use processor::{IdleProcessor, Processor};
