//! The contract shared by every bus strategy.

use format_d64::D64;

use crate::{DeviceId, HostPins, Lines, Result};

/// One host and up to four drives on a shared serial bus.
///
/// The host calls [`update`](Self::update) before and after each burst of
/// its own execution and [`tick`](Self::tick) with the cycles the burst
/// took. How the drives keep up is up to the implementation.
pub trait SerialBus {
    /// Record what the host pulls low. Takes effect at the next `update`.
    fn set_host_output(&mut self, pins: HostPins);

    /// Resolve the lines from every participant's current output and
    /// deliver them to every drive.
    fn update(&mut self) -> Lines;

    /// Lines as of the last `update`.
    fn host_input(&self) -> Lines;

    /// Let the drives run `cycles` of host time.
    fn tick(&mut self, cycles: u32);

    /// Insert a disk into one drive, returning the disk it replaced.
    fn insert_disk(&mut self, device: DeviceId, image: D64) -> Result<Option<D64>>;

    /// Remove the disk from one drive.
    fn eject_disk(&mut self, device: DeviceId) -> Result<Option<D64>>;

    /// Disconnect a drive. Its pins stop pulling anything.
    fn detach(&mut self, device: DeviceId) -> Result<()>;

    /// Attached devices in ascending order.
    fn devices(&self) -> Vec<DeviceId>;
}
