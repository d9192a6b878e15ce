//! Commodore 1541 floppy drive.
//!
//! The drive has its own 6502 at ~1 MHz, 2 KB RAM, 16 KB ROM and two
//! MOS 6522 VIAs:
//!
//! - VIA1 ($1800) faces the serial bus. Port B carries the ATN/CLK/DATA
//!   inputs and outputs; CA1 sees ATN.
//! - VIA2 ($1C00) faces the mechanics. Port A is the GCR byte under the
//!   head, port B drives the stepper, motor and LED and reads back SYNC
//!   and write protect. CA1 receives byte-ready, CB2 low selects write
//!   mode.
//!
//! Byte-ready also pulses the processor's SO pin, which the ROM's
//! `BVC *` loops poll. The processor itself is supplied by the caller
//! through [`emu_core::Processor`].

mod config;
mod disk;
mod drive;
mod error;
mod iec_port;
mod memory;
mod rom;

pub use config::{DriveConfig, TraceFlags};
pub use disk::DiskController;
pub use drive::Drive1541;
pub use error::{DriveError, Result};
pub use iec_port::IecPort;
pub use memory::DriveBus;
pub use rom::{DriveRom, ROM_SIZE};
