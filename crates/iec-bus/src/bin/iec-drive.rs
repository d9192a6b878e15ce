//! One 1541 drive serving a serial bus segment for a host process.
//!
//! Built with the idle processor: mechanics, VIA timers and the ATN
//! acknowledge gate run, drive firmware does not. Embedders with a 6502
//! core call [`iec_bus::worker_main`] from their own binary.

use std::process::ExitCode;

use emu_core::IdleProcessor;

fn main() -> ExitCode {
    iec_bus::worker_main(IdleProcessor::new)
}
