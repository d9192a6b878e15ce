//! Instruction-level processor contract.

use crate::Bus;

/// An instruction-level processor driven in cycle bursts.
///
/// The processor is an external collaborator: the drive only needs to run it
/// for a number of cycles and to drive its interrupt inputs.
pub trait Processor {
    /// Execute whole instructions until at least `cycles` have elapsed.
    ///
    /// Returns the cycles actually consumed. This may exceed `cycles` by up
    /// to one instruction but is never less; the caller carries the
    /// overshoot into its next burst.
    fn execute<B: Bus>(&mut self, bus: &mut B, cycles: u32) -> u32;

    /// Drive the level-sensitive IRQ input (true = asserted).
    fn set_irq(&mut self, asserted: bool);

    /// Drive the edge-sensitive NMI input (true = asserted).
    fn set_nmi(&mut self, asserted: bool);

    /// Pulse the SO pin, setting the overflow flag.
    fn set_overflow(&mut self);

    /// Reset, loading the program counter from the reset vector.
    fn reset<B: Bus>(&mut self, bus: &mut B);

    /// Current program counter.
    fn pc(&self) -> u16;
}

/// A processor that consumes cycles without fetching instructions.
///
/// Records its input lines so that drive mechanics, VIA timers and the
/// serial bus can run (and be observed) without firmware.
#[derive(Debug, Clone, Default)]
pub struct IdleProcessor {
    /// Cycles consumed per instruction; bursts round up to a multiple.
    step: u32,
    pc: u16,
    irq: bool,
    nmi: bool,
    overflow_pulses: u64,
    cycles: u64,
}

impl IdleProcessor {
    /// An idle processor that consumes exactly the cycles it is given.
    #[must_use]
    pub fn new() -> Self {
        Self::with_step(1)
    }

    /// An idle processor whose "instructions" take `step` cycles each.
    #[must_use]
    pub fn with_step(step: u32) -> Self {
        Self {
            step: step.max(1),
            ..Self::default()
        }
    }

    /// Whether the IRQ input is currently asserted.
    #[must_use]
    pub fn irq(&self) -> bool {
        self.irq
    }

    /// Whether the NMI input is currently asserted.
    #[must_use]
    pub fn nmi(&self) -> bool {
        self.nmi
    }

    /// Number of SO pulses received since creation.
    #[must_use]
    pub fn overflow_pulses(&self) -> u64 {
        self.overflow_pulses
    }

    /// Total cycles consumed.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl Processor for IdleProcessor {
    fn execute<B: Bus>(&mut self, _bus: &mut B, cycles: u32) -> u32 {
        let consumed = cycles.div_ceil(self.step) * self.step;
        self.cycles += u64::from(consumed);
        consumed
    }

    fn set_irq(&mut self, asserted: bool) {
        self.irq = asserted;
    }

    fn set_nmi(&mut self, asserted: bool) {
        self.nmi = asserted;
    }

    fn set_overflow(&mut self) {
        self.overflow_pulses += 1;
    }

    fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.pc = bus.read_word(0xFFFC);
        self.irq = false;
        self.nmi = false;
    }

    fn pc(&self) -> u16 {
        self.pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat([u8; 0x10000]);

    impl Bus for Flat {
        fn read(&mut self, address: u16) -> u8 {
            self.0[address as usize]
        }

        fn write(&mut self, address: u16, value: u8) {
            self.0[address as usize] = value;
        }
    }

    #[test]
    fn idle_rounds_up_to_instruction_length() {
        let mut bus = Flat([0; 0x10000]);
        let mut cpu = IdleProcessor::with_step(4);
        assert_eq!(cpu.execute(&mut bus, 1), 4);
        assert_eq!(cpu.execute(&mut bus, 8), 8);
        assert_eq!(cpu.execute(&mut bus, 9), 12);
        assert_eq!(cpu.cycles(), 24);
    }

    #[test]
    fn reset_loads_vector() {
        let mut bus = Flat([0; 0x10000]);
        bus.0[0xFFFC] = 0x00;
        bus.0[0xFFFD] = 0xEA;
        let mut cpu = IdleProcessor::new();
        cpu.set_irq(true);
        cpu.reset(&mut bus);
        assert_eq!(cpu.pc(), 0xEA00);
        assert!(!cpu.irq());
    }
}
