//! Host and drives on one thread: the reference model.

use std::collections::BTreeMap;

use drive_1541::Drive1541;
use emu_core::Processor;
use format_d64::D64;

use crate::{BusError, DeviceId, DriveOutput, HostPins, Lines, Result, SerialBus, resolve};

/// Every drive is ticked directly from the host's thread.
///
/// Fully deterministic; `update` may be called as often as needed.
pub struct LockstepBus<P: Processor> {
    drives: BTreeMap<DeviceId, Drive1541<P>>,
    host: HostPins,
    lines: Lines,
}

impl<P: Processor> LockstepBus<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            drives: BTreeMap::new(),
            host: HostPins::default(),
            lines: Lines::RELEASED,
        }
    }

    /// Connect a drive at its configured device number.
    pub fn attach(&mut self, mut drive: Drive1541<P>) -> Result<DeviceId> {
        let device = DeviceId::new(drive.device())?;
        if self.drives.contains_key(&device) {
            return Err(BusError::Attached(device));
        }
        self.lines.apply(&mut drive);
        self.drives.insert(device, drive);
        log::debug!("drive {device} attached");
        Ok(device)
    }

    #[must_use]
    pub fn drive(&self, device: DeviceId) -> Option<&Drive1541<P>> {
        self.drives.get(&device)
    }

    pub fn drive_mut(&mut self, device: DeviceId) -> Option<&mut Drive1541<P>> {
        self.drives.get_mut(&device)
    }

    fn attached(&mut self, device: DeviceId) -> Result<&mut Drive1541<P>> {
        self.drives
            .get_mut(&device)
            .ok_or(BusError::NotAttached(device))
    }
}

impl<P: Processor> Default for LockstepBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Processor> SerialBus for LockstepBus<P> {
    fn set_host_output(&mut self, pins: HostPins) {
        self.host = pins;
    }

    fn update(&mut self) -> Lines {
        let lines = resolve(self.host, self.drives.values().map(DriveOutput::of));
        for drive in self.drives.values_mut() {
            lines.apply(drive);
        }
        self.lines = lines;
        lines
    }

    fn host_input(&self) -> Lines {
        self.lines
    }

    fn tick(&mut self, cycles: u32) {
        for drive in self.drives.values_mut() {
            drive.tick(cycles);
        }
    }

    fn insert_disk(&mut self, device: DeviceId, image: D64) -> Result<Option<D64>> {
        Ok(self.attached(device)?.insert_disk(image))
    }

    fn eject_disk(&mut self, device: DeviceId) -> Result<Option<D64>> {
        Ok(self.attached(device)?.eject_disk())
    }

    fn detach(&mut self, device: DeviceId) -> Result<()> {
        self.drives
            .remove(&device)
            .ok_or(BusError::NotAttached(device))?;
        log::debug!("drive {device} detached");
        Ok(())
    }

    fn devices(&self) -> Vec<DeviceId> {
        self.drives.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_1541::{DriveConfig, DriveRom, ROM_SIZE};
    use emu_core::{Bus, IdleProcessor};

    fn drive(device: u8) -> Drive1541<IdleProcessor> {
        let rom = DriveRom::from_bytes(&vec![0xEA; ROM_SIZE]).expect("rom");
        let config = DriveConfig {
            device,
            ..DriveConfig::default()
        };
        Drive1541::new(IdleProcessor::new(), rom, config).expect("drive")
    }

    #[test]
    fn atn_is_acknowledged_on_data() {
        let mut bus = LockstepBus::new();
        bus.attach(drive(8)).expect("attach");
        assert_eq!(bus.update(), Lines::RELEASED);

        bus.set_host_output(HostPins {
            atn: true,
            ..HostPins::default()
        });
        bus.update();
        // The drive's ATN gate now pulls DATA; the host sees it next update.
        let lines = bus.update();
        assert!(!lines.atn);
        assert!(!lines.data);
        assert!(lines.clk);
        assert_eq!(bus.host_input(), lines);
    }

    #[test]
    fn one_drive_pulling_holds_the_line() {
        let mut bus = LockstepBus::new();
        let eight = bus.attach(drive(8)).expect("attach");
        bus.attach(drive(9)).expect("attach");
        let memory = bus.drive_mut(eight).expect("attached").bus_mut();
        memory.write(0x1802, 0x1A);
        memory.write(0x1800, 0x08);
        assert!(!bus.update().clk);
        bus.detach(eight).expect("detach");
        assert!(bus.update().clk);
        assert_eq!(bus.devices(), vec![DeviceId::new(9).expect("valid")]);
    }

    #[test]
    fn duplicate_and_missing_devices() {
        let mut bus = LockstepBus::new();
        bus.attach(drive(8)).expect("attach");
        assert!(matches!(bus.attach(drive(8)), Err(BusError::Attached(_))));
        let ten = DeviceId::new(10).expect("valid");
        assert!(matches!(bus.eject_disk(ten), Err(BusError::NotAttached(_))));
        assert!(matches!(bus.detach(ten), Err(BusError::NotAttached(_))));
    }

    #[test]
    fn tick_reaches_every_drive() {
        let mut bus = LockstepBus::new();
        let eight = bus.attach(drive(8)).expect("attach");
        let nine = bus.attach(drive(9)).expect("attach");
        bus.tick(100);
        assert_eq!(bus.drive(eight).expect("attached").cycles(), 100);
        assert_eq!(bus.drive(nine).expect("attached").cycles(), 100);
    }

    #[test]
    fn disk_swap() {
        let mut bus = LockstepBus::new();
        let eight = bus.attach(drive(8)).expect("attach");
        let first = D64::formatted(b"ONE", *b"01").expect("format");
        assert!(bus.insert_disk(eight, first).expect("insert").is_none());
        let second = D64::formatted(b"TWO", *b"02").expect("format");
        let replaced = bus.insert_disk(eight, second).expect("insert").expect("disk");
        assert_eq!(replaced.disk_id(), *b"01");
        let ejected = bus.eject_disk(eight).expect("eject").expect("disk");
        assert_eq!(ejected.disk_id(), *b"02");
    }
}
