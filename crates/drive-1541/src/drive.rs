//! The drive as a whole: processor, memory map and the byte-ready coupling
//! between the disk controller and the 6502.

use emu_core::{Observable, Processor, Value};
use format_d64::D64;

use crate::config::{DriveConfig, TraceFlags};
use crate::memory::DriveBus;
use crate::rom::DriveRom;
use crate::Result;

/// A 1541 floppy drive around any 6502-compatible processor.
pub struct Drive1541<P: Processor> {
    cpu: P,
    bus: DriveBus,
    config: DriveConfig,
    /// Cycles the processor ran ahead of the last `tick` budget.
    cycle_debt: u32,
    /// Total cycles executed.
    cycles: u64,
    /// IRQ level last pushed to the processor.
    irq: bool,
}

impl<P: Processor> Drive1541<P> {
    /// Build a drive and take it through reset.
    pub fn new(cpu: P, rom: DriveRom, config: DriveConfig) -> Result<Self> {
        config.validate()?;
        log::debug!("drive {} reset vector {:#06X}", config.device, rom.reset_vector());
        let mut drive = Self {
            cpu,
            bus: DriveBus::new(rom, &config),
            config,
            cycle_debt: 0,
            cycles: 0,
            irq: false,
        };
        drive.reset();
        Ok(drive)
    }

    /// Hardware reset. The disk stays in the drive.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cycle_debt = 0;
        self.irq = false;
        self.cpu.set_irq(false);
        self.cpu.reset(&mut self.bus);
    }

    /// Run the drive for `cycles` of its 1 MHz clock.
    ///
    /// Instructions are never split: an instruction that crosses the end of
    /// the budget completes, and the overshoot is taken off the next call.
    pub fn tick(&mut self, cycles: u32) {
        let paid = self.cycle_debt.min(cycles);
        self.cycle_debt -= paid;
        let mut budget = cycles - paid;

        while budget > 0 {
            let consumed = self.cpu.execute(&mut self.bus, 1).max(1);
            self.advance(consumed);
            if consumed > budget {
                self.cycle_debt += consumed - budget;
                budget = 0;
            } else {
                budget -= consumed;
            }
        }
    }

    /// Bring the hardware up to date with the processor.
    fn advance(&mut self, cycles: u32) {
        self.cycles += u64::from(cycles);
        self.bus.via1.tick(cycles);
        self.bus.via2.tick(cycles);

        let writing = !self.bus.via2.cb2_output();
        self.bus.via2.client_mut().set_write_mode(writing);

        let due = self.bus.via2.client_mut().rotate(cycles);
        for _ in 0..due {
            if self.bus.via2.client_mut().step_byte() {
                self.byte_ready();
            }
        }
        self.update_irq();
    }

    /// SO pulse plus a falling then rising edge on VIA2 CA1.
    fn byte_ready(&mut self) {
        self.cpu.set_overflow();
        self.bus.via2.set_ca1(false);
        self.bus.via2.set_ca1(true);
    }

    fn update_irq(&mut self) {
        let irq = self.bus.via1.irq() || self.bus.via2.irq();
        if irq != self.irq {
            self.irq = irq;
            self.cpu.set_irq(irq);
        }
    }

    // Serial bus pins. Lines are true when released (high).

    /// Resolved ATN line. Asserting it raises CA1 on VIA1.
    pub fn set_atn_in(&mut self, line: bool) {
        let port = self.bus.via1.client_mut();
        if port.atn_asserted() == !line {
            return;
        }
        port.set_atn(line);
        if self.config.trace.contains(TraceFlags::IEC) {
            log::trace!(
                "drive {}: atn {}",
                self.config.device,
                if line { "released" } else { "asserted" }
            );
        }
        self.bus.via1.set_ca1(!line);
        self.update_irq();
    }

    /// Resolved CLK line.
    pub fn set_clk_in(&mut self, line: bool) {
        self.bus.via1.client_mut().set_clk(line);
    }

    /// Resolved DATA line.
    pub fn set_data_in(&mut self, line: bool) {
        self.bus.via1.client_mut().set_data(line);
    }

    /// CLK as driven by this drive (true = released).
    #[must_use]
    pub fn clk_out(&self) -> bool {
        self.bus.via1.client().clk_out()
    }

    /// DATA as driven by this drive (true = released).
    #[must_use]
    pub fn data_out(&self) -> bool {
        self.bus.via1.client().data_out()
    }

    // Disk handling.

    /// Insert a disk, returning the one it replaces.
    pub fn insert_disk(&mut self, image: D64) -> Option<D64> {
        self.bus.via2.client_mut().insert(image)
    }

    /// Remove the disk, with every completed write applied.
    pub fn eject_disk(&mut self) -> Option<D64> {
        self.bus.via2.client_mut().eject()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&D64> {
        self.bus.via2.client().disk()
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.bus.via2.client().has_disk()
    }

    pub fn set_write_protect(&mut self, protect: bool) {
        self.config.write_protect = protect;
        self.bus.via2.client_mut().set_write_protect(protect);
    }

    // Accessors.

    #[must_use]
    pub fn cpu(&self) -> &P {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut P {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &DriveBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut DriveBus {
        &mut self.bus
    }

    #[must_use]
    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    #[must_use]
    pub fn device(&self) -> u8 {
        self.config.device
    }

    /// Total cycles executed since creation.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Cycles already run that the next `tick` will not repeat.
    #[must_use]
    pub fn cycle_debt(&self) -> u32 {
        self.cycle_debt
    }

    #[must_use]
    pub fn track(&self) -> u8 {
        self.bus.via2.client().track()
    }

    #[must_use]
    pub fn half_track(&self) -> u8 {
        self.bus.via2.client().half_track()
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.bus.via2.client().motor_on()
    }

    #[must_use]
    pub fn led_on(&self) -> bool {
        self.bus.via2.client().led_on()
    }

    /// Combined IRQ output of both VIAs.
    #[must_use]
    pub fn irq(&self) -> bool {
        self.irq
    }
}

impl<P: Processor> Observable for Drive1541<P> {
    fn query(&self, path: &str) -> Option<Value> {
        let disk = self.bus.via2.client();
        if let Some(rest) = path.strip_prefix("via1.") {
            match rest {
                "ifr" => Some(self.bus.via1.ifr().into()),
                "ier" => Some(self.bus.via1.ier().into()),
                "pcr" => Some(self.bus.via1.pcr().into()),
                "port_b" => Some(self.bus.via1.port_b_output().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("via2.") {
            match rest {
                "ifr" => Some(self.bus.via2.ifr().into()),
                "ier" => Some(self.bus.via2.ier().into()),
                "pcr" => Some(self.bus.via2.pcr().into()),
                "port_b" => Some(self.bus.via2.port_b_output().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("iec.") {
            match rest {
                "atn" => Some(self.bus.via1.client().atn_asserted().into()),
                "clk_out" => Some(self.clk_out().into()),
                "data_out" => Some(self.data_out().into()),
                _ => None,
            }
        } else {
            match path {
                "track" => Some(disk.track().into()),
                "half_track" => Some(disk.half_track().into()),
                "motor" => Some(disk.motor_on().into()),
                "led" => Some(disk.led_on().into()),
                "density" => Some(disk.density().into()),
                "has_disk" => Some(disk.has_disk().into()),
                "write_protect" => Some(disk.write_protect().into()),
                "sync" => Some(disk.in_sync().into()),
                "write_mode" => Some(disk.writing().into()),
                "irq" => Some(self.irq.into()),
                "cycles" => Some(self.cycles.into()),
                "pc" => Some(self.cpu.pc().into()),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "track",
            "half_track",
            "motor",
            "led",
            "density",
            "has_disk",
            "write_protect",
            "sync",
            "write_mode",
            "irq",
            "cycles",
            "pc",
            "via1.ifr",
            "via1.ier",
            "via1.pcr",
            "via1.port_b",
            "via2.ifr",
            "via2.ier",
            "via2.pcr",
            "via2.port_b",
            "iec.atn",
            "iec.clk_out",
            "iec.data_out",
        ]
    }
}
