//! Commodore serial (IEC) bus linking a host to 1541 drives.
//!
//! Three open-collector lines, ATN, CLK and DATA, are shared by the host and
//! up to four drives. [`SerialBus`] is the contract; it comes in three
//! strengths:
//!
//! - [`LockstepBus`]: drives ticked on the host's thread. Deterministic.
//! - [`ThreadedBus`]: each drive on a thread, at most one `tick` behind.
//! - [`ProcessBus`]: each drive in its own process sharing a mapped segment,
//!   at most one batch behind.

mod bus;
mod config;
mod error;
mod lines;
mod lockstep;
mod process;
mod threaded;

pub use bus::SerialBus;
pub use config::BusConfig;
pub use error::{BusError, Result, SegmentError};
pub use lines::{DeviceId, DriveOutput, HostPins, Lines, resolve};
pub use lockstep::LockstepBus;
pub use process::{
    Backoff, Batch, Command, DriveWorker, ProcessBus, Reply, SEGMENT_SIZE, Segment,
    WorkerArgs, WorkerCommand, wait_until, worker_main,
};
pub use threaded::ThreadedBus;
