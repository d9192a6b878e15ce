//! Address decoding for the drive's 6502.
//!
//! | Range         | Device                                    |
//! |---------------|-------------------------------------------|
//! | $0000-$07FF   | 2 KB RAM                                  |
//! | $1800-$1BFF   | VIA1, serial bus (16 registers mirrored)  |
//! | $1C00-$1FFF   | VIA2, disk controller (mirrored)          |
//! | $C000-$FFFF   | 16 KB ROM                                 |
//!
//! Everything else reads as $FF and ignores writes.

#![allow(clippy::cast_possible_truncation)]

use emu_core::Bus;
use mos_via_6522::Via6522;

use crate::config::DriveConfig;
use crate::disk::DiskController;
use crate::iec_port::IecPort;
use crate::rom::DriveRom;

const RAM_SIZE: usize = 0x0800;
const OPEN_BUS: u8 = 0xFF;

/// The drive's memory and I/O.
#[derive(Debug, Clone)]
pub struct DriveBus {
    ram: [u8; RAM_SIZE],
    rom: DriveRom,
    /// VIA1: serial bus interface.
    pub via1: Via6522<IecPort>,
    /// VIA2: disk controller.
    pub via2: Via6522<DiskController>,
}

impl DriveBus {
    #[must_use]
    pub fn new(rom: DriveRom, config: &DriveConfig) -> Self {
        let mut via1 = Via6522::new(IecPort::new(config.jumpers(), config.trace));
        // CA1 sees ATN through an inverter: low while ATN is released.
        via1.set_ca1(false);
        via1.reset();
        Self {
            ram: [0; RAM_SIZE],
            rom,
            via1,
            via2: Via6522::new(DiskController::new(config.write_protect, config.trace)),
        }
    }

    /// Reset both VIAs. RAM keeps its contents and the head stays put.
    pub fn reset(&mut self) {
        let half_track = self.via2.client().half_track();
        self.via1.reset();
        self.via2.reset();
        self.via2.client_mut().settle(half_track);
    }

    #[must_use]
    pub fn rom(&self) -> &DriveRom {
        &self.rom
    }

    /// RAM contents.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Read memory without side effects. VIA registers read as open bus.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x07FF => self.ram[address as usize],
            0xC000..=0xFFFF => self.rom.read(address),
            _ => OPEN_BUS,
        }
    }
}

impl Bus for DriveBus {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            0x1800..=0x1BFF => self.via1.read((address & 0x0F) as u8),
            0x1C00..=0x1FFF => self.via2.read((address & 0x0F) as u8),
            _ => self.peek(address),
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x07FF => self.ram[address as usize] = value,
            0x1800..=0x1BFF => self.via1.write((address & 0x0F) as u8, value),
            0x1C00..=0x1FFF => self.via2.write((address & 0x0F) as u8, value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::ROM_SIZE;

    fn bus() -> DriveBus {
        let mut image = vec![0xEA; ROM_SIZE];
        image[0] = 0x4C;
        let rom = DriveRom::from_bytes(&image).expect("rom");
        DriveBus::new(rom, &DriveConfig::default())
    }

    #[test]
    fn ram_and_rom() {
        let mut bus = bus();
        bus.write(0x0300, 0x42);
        assert_eq!(bus.read(0x0300), 0x42);
        assert_eq!(bus.read(0xC000), 0x4C);
        bus.write(0xC000, 0x00);
        assert_eq!(bus.read(0xC000), 0x4C);
    }

    #[test]
    fn unmapped_is_open_bus() {
        let mut bus = bus();
        bus.write(0x0900, 0x12);
        assert_eq!(bus.read(0x0900), 0xFF);
        assert_eq!(bus.read(0x2000), 0xFF);
        assert_eq!(bus.read(0x8000), 0xFF);
        assert_eq!(bus.ram()[0x0100], 0);
    }

    #[test]
    fn via_registers_are_mirrored() {
        let mut bus = bus();
        bus.write(0x1802, 0x1A);
        assert_eq!(bus.read(0x1802), 0x1A);
        assert_eq!(bus.read(0x1812), 0x1A);
        assert_eq!(bus.read(0x1BF2), 0x1A);
        bus.write(0x1C0E, 0x82);
        assert_eq!(bus.via2.ier(), 0x02);
        assert_eq!(bus.via1.ier(), 0x00);
    }

    #[test]
    fn reset_keeps_the_head() {
        let mut bus = bus();
        bus.write(0x1C02, 0x6F);
        bus.write(0x1C00, 0x05);
        assert_eq!(bus.via2.client().half_track(), 37);
        bus.reset();
        assert_eq!(bus.via2.client().half_track(), 37);
        assert!(!bus.via2.client().motor_on());
    }
}
