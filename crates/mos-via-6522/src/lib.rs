//! MOS 6522 Versatile Interface Adapter (VIA).
//!
//! The 6522 provides two 8-bit I/O ports, two 16-bit timers, a serial
//! shift register, four control lines and an interrupt controller. The
//! 1541 floppy drive uses two: one faces the serial bus, the other the
//! disk mechanics. Whatever is wired to the ports implements
//! [`PortClient`] and is owned by the VIA.
//!
//! # Registers ($0-$F)
//!
//! | Reg | Name | Description                              |
//! |-----|------|------------------------------------------|
//! | $0  | ORB  | Port B data (handshake)                  |
//! | $1  | ORA  | Port A data (handshake)                  |
//! | $2  | DDRB | Port B data direction (1 = output)       |
//! | $3  | DDRA | Port A data direction (1 = output)       |
//! | $4  | T1CL | Timer 1 counter low (read clears T1 IRQ) |
//! | $5  | T1CH | Timer 1 counter high (write starts T1)   |
//! | $6  | T1LL | Timer 1 latch low                        |
//! | $7  | T1LH | Timer 1 latch high                       |
//! | $8  | T2CL | Timer 2 counter low (read clears T2 IRQ) |
//! | $9  | T2CH | Timer 2 counter high (write starts T2)   |
//! | $A  | SR   | Shift register                           |
//! | $B  | ACR  | Auxiliary control register               |
//! | $C  | PCR  | Peripheral control register              |
//! | $D  | IFR  | Interrupt flag register                  |
//! | $E  | IER  | Interrupt enable register                |
//! | $F  | ORA  | Port A data (no handshake)               |
//!
//! # Timing
//!
//! [`Via6522::tick`] advances any number of cycles at once. A running
//! timer loaded with N underflows N + 1 cycles later; in continuous mode
//! it then reloads and underflows every latch + 1 cycles. Stopped timers
//! keep decrementing without raising interrupts.

#![allow(clippy::cast_possible_truncation)]

mod port;

pub use port::{OpenPort, PortClient};

// IFR/IER bit masks
const IFR_CA2: u8 = 0x01;
const IFR_CA1: u8 = 0x02;
const IFR_SR: u8 = 0x04;
const IFR_CB2: u8 = 0x08;
const IFR_CB1: u8 = 0x10;
const IFR_T2: u8 = 0x20;
const IFR_T1: u8 = 0x40;

// ACR bits
const ACR_LATCH_A: u8 = 0x01;
const ACR_LATCH_B: u8 = 0x02;
const ACR_T2_PULSES: u8 = 0x20;
const ACR_T1_CONTINUOUS: u8 = 0x40;
const ACR_T1_PB7: u8 = 0x80;

// CA2/CB2 control modes (PCR bits 3-1 and 7-5)
const C2_INDEPENDENT_NEG: u8 = 0b001;
const C2_INDEPENDENT_POS: u8 = 0b011;
const C2_HANDSHAKE: u8 = 0b100;
const C2_PULSE: u8 = 0b101;
const C2_LOW: u8 = 0b110;

// Shift register modes (ACR bits 4-2)
const SR_DISABLED: u8 = 0b000;
const SR_FREE_RUN: u8 = 0b100;

/// MOS 6522 Versatile Interface Adapter.
#[derive(Debug, Clone)]
pub struct Via6522<C: PortClient = OpenPort> {
    client: C,

    /// Port A output register.
    ora: u8,
    /// Port B output register.
    orb: u8,
    /// Port A data direction register (1 = output).
    ddra: u8,
    /// Port B data direction register (1 = output).
    ddrb: u8,
    /// Port A input captured at the last active CA1 edge.
    latch_a: u8,
    /// Port B input captured at the last active CB1 edge.
    latch_b: u8,

    /// Timer 1 counter (16-bit, counts down).
    t1_counter: u16,
    /// Timer 1 latch (16-bit, reloaded into counter in continuous mode).
    t1_latch: u16,
    /// Timer 1 will interrupt on its next underflow.
    t1_running: bool,
    /// PB7 level driven by timer 1 when ACR bit 7 is set.
    pb7: bool,

    /// Timer 2 counter (16-bit, counts down).
    t2_counter: u16,
    /// Timer 2 latch low byte (only low byte is latched).
    t2_latch_lo: u8,
    /// Timer 2 will interrupt on its next underflow.
    t2_running: bool,

    /// Shift register.
    sr: u8,
    /// Bits left to shift before the SR flag is raised (0 = idle).
    sr_bits_left: u8,
    /// Cycles accumulated towards the next shift clock.
    sr_cycles: u32,
    /// Last bit shifted out onto CB2.
    sr_out: bool,

    /// Auxiliary control register (ACR).
    /// Bits 7-6: T1 control (bit 6 = continuous, bit 7 = PB7 output)
    /// Bit 5: T2 control (0 = timed, 1 = count PB6 pulses)
    /// Bits 4-2: Shift register control
    /// Bit 1: PB latching enable
    /// Bit 0: PA latching enable
    acr: u8,

    /// Peripheral control register (PCR).
    /// Bits 7-5: CB2 control
    /// Bit 4: CB1 edge (0 = negative, 1 = positive)
    /// Bits 3-1: CA2 control
    /// Bit 0: CA1 edge (0 = negative, 1 = positive)
    pcr: u8,

    /// Interrupt flag register (IFR), bits 6-0.
    /// Bit 6: Timer 1
    /// Bit 5: Timer 2
    /// Bit 4: CB1
    /// Bit 3: CB2
    /// Bit 2: Shift register
    /// Bit 1: CA1
    /// Bit 0: CA2
    ifr: u8,

    /// Interrupt enable register (IER), same layout as IFR.
    ier: u8,

    /// Input levels for edge detection.
    ca1: bool,
    ca2: bool,
    cb1: bool,
    cb2: bool,

    /// CA2/CB2 pulled low by a handshake or pulse output.
    ca2_low: bool,
    cb2_low: bool,
}

impl Via6522<OpenPort> {
    /// A VIA with nothing attached to its ports.
    #[must_use]
    pub fn open() -> Self {
        Self::new(OpenPort::default())
    }
}

impl Default for Via6522<OpenPort> {
    fn default() -> Self {
        Self::open()
    }
}

impl<C: PortClient> Via6522<C> {
    /// Create a VIA in its reset state, wired to `client`.
    pub fn new(client: C) -> Self {
        Self {
            client,
            ora: 0,
            orb: 0,
            ddra: 0,
            ddrb: 0,
            latch_a: 0,
            latch_b: 0,
            t1_counter: 0xFFFF,
            t1_latch: 0xFFFF,
            t1_running: false,
            pb7: false,
            t2_counter: 0xFFFF,
            t2_latch_lo: 0xFF,
            t2_running: false,
            sr: 0,
            sr_bits_left: 0,
            sr_cycles: 0,
            sr_out: true,
            acr: 0,
            pcr: 0,
            ifr: 0,
            ier: 0,
            ca1: true,
            ca2: true,
            cb1: true,
            cb2: true,
            ca2_low: false,
            cb2_low: false,
        }
    }

    /// Hardware reset: clears every register except the timers and the
    /// shift register contents.
    pub fn reset(&mut self) {
        self.ora = 0;
        self.orb = 0;
        self.ddra = 0;
        self.ddrb = 0;
        self.acr = 0;
        self.pcr = 0;
        self.ifr = 0;
        self.ier = 0;
        self.t1_running = false;
        self.t2_running = false;
        self.sr_bits_left = 0;
        self.ca2_low = false;
        self.cb2_low = false;
        self.pb7 = false;
        self.drive_port_a();
        self.drive_port_b();
    }

    /// The device wired to the ports.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mutable access to the device wired to the ports.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Advance timers and the shift register by `cycles`.
    ///
    /// Every underflow inside the span is accounted for, so a single call
    /// covering a whole instruction is equivalent to stepping cycle by
    /// cycle.
    pub fn tick(&mut self, cycles: u32) {
        if cycles == 0 {
            return;
        }
        self.tick_timer1(cycles);
        self.tick_timer2(cycles);
        self.tick_shift(cycles);

        // Pulse outputs last one cycle.
        if self.ca2_mode() == C2_PULSE {
            self.ca2_low = false;
        }
        if self.cb2_mode() == C2_PULSE {
            self.cb2_low = false;
        }
    }

    /// Whether the VIA has an active (and enabled) interrupt.
    #[must_use]
    pub fn irq(&self) -> bool {
        (self.ifr & self.ier & 0x7F) != 0
    }

    /// Read a VIA register. Register numbers wrap at 16.
    pub fn read(&mut self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => {
                self.clear_port_b_flags();
                self.port_b_value()
            }
            0x01 => {
                self.clear_port_a_flags();
                self.port_a_handshake();
                self.port_a_value()
            }
            0x02 => self.ddrb,
            0x03 => self.ddra,
            0x04 => {
                // T1C-L: read low byte AND clear T1 interrupt flag
                self.ifr &= !IFR_T1;
                self.t1_counter as u8
            }
            0x05 => (self.t1_counter >> 8) as u8,
            0x06 => self.t1_latch as u8,
            0x07 => (self.t1_latch >> 8) as u8,
            0x08 => {
                // T2C-L: read low byte AND clear T2 interrupt flag
                self.ifr &= !IFR_T2;
                self.t2_counter as u8
            }
            0x09 => (self.t2_counter >> 8) as u8,
            0x0A => {
                self.start_shift();
                self.sr
            }
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => self.ifr(),
            // IER: bit 7 always reads as 1
            0x0E => self.ier | 0x80,
            _ => self.port_a_value(),
        }
    }

    /// Write a VIA register. Register numbers wrap at 16.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => {
                self.clear_port_b_flags();
                if matches!(self.cb2_mode(), C2_HANDSHAKE | C2_PULSE) {
                    self.cb2_low = true;
                }
                self.orb = value;
                self.drive_port_b();
            }
            0x01 => {
                self.clear_port_a_flags();
                self.port_a_handshake();
                self.ora = value;
                self.drive_port_a();
            }
            0x02 => {
                self.ddrb = value;
                self.drive_port_b();
            }
            0x03 => {
                self.ddra = value;
                self.drive_port_a();
            }
            0x04 | 0x06 => {
                self.t1_latch = (self.t1_latch & 0xFF00) | u16::from(value);
            }
            0x05 => {
                // T1C-H: latch high, load counter, start, clear flag.
                self.t1_latch = (self.t1_latch & 0x00FF) | (u16::from(value) << 8);
                self.t1_counter = self.t1_latch;
                self.t1_running = true;
                self.ifr &= !IFR_T1;
                if self.acr & ACR_T1_PB7 != 0 {
                    self.pb7 = false;
                    self.drive_port_b();
                }
            }
            0x07 => {
                // T1L-H: latch high only. A running timer picks up the new
                // latch immediately.
                self.t1_latch = (self.t1_latch & 0x00FF) | (u16::from(value) << 8);
                self.ifr &= !IFR_T1;
                if self.t1_running {
                    self.t1_counter = self.t1_latch;
                }
            }
            0x08 => self.t2_latch_lo = value,
            0x09 => {
                // T2C-H: load counter (high from value, low from latch),
                // start timer, clear T2 interrupt flag.
                self.t2_counter = u16::from(self.t2_latch_lo) | (u16::from(value) << 8);
                self.t2_running = true;
                self.ifr &= !IFR_T2;
            }
            0x0A => {
                self.sr = value;
                self.start_shift();
            }
            0x0B => {
                let changed = self.acr ^ value;
                self.acr = value;
                if self.shift_mode() == SR_DISABLED {
                    self.sr_bits_left = 0;
                }
                if changed & ACR_T1_PB7 != 0 {
                    self.pb7 = true;
                    self.drive_port_b();
                }
            }
            0x0C => self.pcr = value,
            0x0D => {
                // IFR: writing 1s clears the corresponding flags
                self.ifr &= !value;
            }
            0x0E => {
                // IER: bit 7 selects set (1) or clear (0) mode
                if value & 0x80 != 0 {
                    self.ier |= value & 0x7F;
                } else {
                    self.ier &= !(value & 0x7F);
                }
            }
            _ => {
                // ORA no-handshake: write port A without touching CA1/CA2
                self.ora = value;
                self.drive_port_a();
            }
        }
    }

    /// Drive the CA1 input. The active edge is selected by PCR bit 0.
    ///
    /// On the active edge: sets the CA1 flag, captures port A if ACR
    /// latching is on, and ends a CA2 handshake.
    pub fn set_ca1(&mut self, state: bool) {
        if Self::is_active_edge(self.ca1, state, self.pcr & 0x01 != 0) {
            self.ifr |= IFR_CA1;
            if self.acr & ACR_LATCH_A != 0 {
                self.latch_a = self.client.read_port_a();
            }
            if self.ca2_mode() == C2_HANDSHAKE {
                self.ca2_low = false;
            }
        }
        self.ca1 = state;
    }

    /// Drive the CB1 input. The active edge is selected by PCR bit 4.
    ///
    /// With the shift register on an external clock, each rising edge
    /// also shifts one bit.
    pub fn set_cb1(&mut self, state: bool) {
        if Self::is_active_edge(self.cb1, state, self.pcr & 0x10 != 0) {
            self.ifr |= IFR_CB1;
            if self.acr & ACR_LATCH_B != 0 {
                self.latch_b = self.client.read_port_b();
            }
            if self.cb2_mode() == C2_HANDSHAKE {
                self.cb2_low = false;
            }
        }
        let rising = !self.cb1 && state;
        self.cb1 = state;
        if rising && self.shift_mode() & 0b011 == 0b011 && self.sr_bits_left > 0 {
            self.shift_bit();
        }
    }

    /// Drive the CA2 input. Ignored while CA2 is an output.
    pub fn set_ca2(&mut self, state: bool) {
        let mode = self.ca2_mode();
        if mode & 0b100 == 0 && Self::is_active_edge(self.ca2, state, mode & 0b010 != 0) {
            self.ifr |= IFR_CA2;
        }
        self.ca2 = state;
    }

    /// Drive the CB2 input. Also the serial input of the shift register.
    pub fn set_cb2(&mut self, state: bool) {
        let mode = self.cb2_mode();
        if mode & 0b100 == 0 && Self::is_active_edge(self.cb2, state, mode & 0b010 != 0) {
            self.ifr |= IFR_CB2;
        }
        self.cb2 = state;
    }

    /// Count one negative-going pulse on PB6 (timer 2 pulse-counting mode).
    pub fn pulse_pb6(&mut self) {
        if self.acr & ACR_T2_PULSES == 0 {
            return;
        }
        self.t2_counter = self.t2_counter.wrapping_sub(1);
        if self.t2_running && self.t2_counter == 0 {
            self.ifr |= IFR_T2;
            self.t2_running = false;
        }
    }

    /// Level the VIA drives on CA2. Input modes leave the line high.
    #[must_use]
    pub fn ca2_output(&self) -> bool {
        Self::c2_level(self.ca2_mode(), self.ca2_low)
    }

    /// Level the VIA drives on CB2.
    ///
    /// Shift-out modes put the last shifted bit on CB2.
    #[must_use]
    pub fn cb2_output(&self) -> bool {
        if self.shift_mode() & 0b100 != 0 {
            return self.sr_out;
        }
        Self::c2_level(self.cb2_mode(), self.cb2_low)
    }

    /// Port A output value (port register masked by DDR).
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        self.ora & self.ddra
    }

    /// Port B output value (port register masked by DDR).
    ///
    /// With ACR bit 7 set, bit 7 is timer 1's PB7 output instead.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        let out = self.orb & self.ddrb;
        if self.acr & ACR_T1_PB7 != 0 {
            (out & 0x7F) | if self.pb7 { 0x80 } else { 0 }
        } else {
            out
        }
    }

    /// IFR as read by the CPU: bit 7 set when any enabled flag is set.
    #[must_use]
    pub fn ifr(&self) -> u8 {
        (self.ifr & 0x7F) | if self.irq() { 0x80 } else { 0 }
    }

    #[must_use]
    pub fn ier(&self) -> u8 {
        self.ier
    }

    #[must_use]
    pub fn acr(&self) -> u8 {
        self.acr
    }

    #[must_use]
    pub fn pcr(&self) -> u8 {
        self.pcr
    }

    #[must_use]
    pub fn timer1_counter(&self) -> u16 {
        self.t1_counter
    }

    #[must_use]
    pub fn timer1_latch(&self) -> u16 {
        self.t1_latch
    }

    /// Whether timer 1 will interrupt on its next underflow.
    #[must_use]
    pub fn timer1_running(&self) -> bool {
        self.t1_running
    }

    #[must_use]
    pub fn timer2_counter(&self) -> u16 {
        self.t2_counter
    }

    /// Whether timer 2 will interrupt on its next underflow.
    #[must_use]
    pub fn timer2_running(&self) -> bool {
        self.t2_running
    }

    /// Shift register contents, without the side effects of a read.
    #[must_use]
    pub fn shift_register(&self) -> u8 {
        self.sr
    }

    // --- Internal helpers ---

    fn is_active_edge(previous: bool, state: bool, positive: bool) -> bool {
        if positive {
            !previous && state
        } else {
            previous && !state
        }
    }

    fn c2_level(mode: u8, pulled_low: bool) -> bool {
        match mode {
            C2_HANDSHAKE | C2_PULSE => !pulled_low,
            C2_LOW => false,
            _ => true,
        }
    }

    fn ca2_mode(&self) -> u8 {
        (self.pcr >> 1) & 0x07
    }

    fn cb2_mode(&self) -> u8 {
        (self.pcr >> 5) & 0x07
    }

    fn shift_mode(&self) -> u8 {
        (self.acr >> 2) & 0x07
    }

    /// ORA access clears CA1, and CA2 unless CA2 is an independent input.
    fn clear_port_a_flags(&mut self) {
        self.ifr &= !IFR_CA1;
        if !matches!(self.ca2_mode(), C2_INDEPENDENT_NEG | C2_INDEPENDENT_POS) {
            self.ifr &= !IFR_CA2;
        }
    }

    /// ORB access clears CB1, and CB2 unless CB2 is an independent input.
    fn clear_port_b_flags(&mut self) {
        self.ifr &= !IFR_CB1;
        if !matches!(self.cb2_mode(), C2_INDEPENDENT_NEG | C2_INDEPENDENT_POS) {
            self.ifr &= !IFR_CB2;
        }
    }

    fn port_a_handshake(&mut self) {
        if matches!(self.ca2_mode(), C2_HANDSHAKE | C2_PULSE) {
            self.ca2_low = true;
        }
    }

    fn port_a_value(&self) -> u8 {
        let input = if self.acr & ACR_LATCH_A != 0 {
            self.latch_a
        } else {
            self.client.read_port_a()
        };
        (self.ora & self.ddra) | (input & !self.ddra)
    }

    fn port_b_value(&self) -> u8 {
        let input = if self.acr & ACR_LATCH_B != 0 {
            self.latch_b
        } else {
            self.client.read_port_b()
        };
        let value = (self.orb & self.ddrb) | (input & !self.ddrb);
        if self.acr & ACR_T1_PB7 != 0 {
            (value & 0x7F) | if self.pb7 { 0x80 } else { 0 }
        } else {
            value
        }
    }

    fn drive_port_a(&mut self) {
        let output = self.port_a_output();
        self.client.write_port_a(output);
    }

    fn drive_port_b(&mut self) {
        let output = self.port_b_output();
        self.client.write_port_b(output);
    }

    fn tick_timer1(&mut self, cycles: u32) {
        let counter = u32::from(self.t1_counter);
        if !self.t1_running || cycles <= counter {
            self.t1_counter = counter.wrapping_sub(cycles) as u16;
            return;
        }

        // Cycles left over after the first underflow.
        let overshoot = cycles - counter - 1;
        self.ifr |= IFR_T1;

        if self.acr & ACR_T1_CONTINUOUS != 0 {
            let period = u32::from(self.t1_latch) + 1;
            let underflows = 1 + overshoot / period;
            self.t1_counter = (u32::from(self.t1_latch) - overshoot % period) as u16;
            if self.acr & ACR_T1_PB7 != 0 && underflows % 2 == 1 {
                self.pb7 = !self.pb7;
                self.drive_port_b();
            }
        } else {
            self.t1_running = false;
            self.t1_counter = counter.wrapping_sub(cycles) as u16;
            if self.acr & ACR_T1_PB7 != 0 {
                self.pb7 = true;
                self.drive_port_b();
            }
        }
    }

    fn tick_timer2(&mut self, cycles: u32) {
        if self.acr & ACR_T2_PULSES != 0 {
            return; // Pulse counting mode, driven by pulse_pb6()
        }
        let counter = u32::from(self.t2_counter);
        if self.t2_running && cycles > counter {
            self.ifr |= IFR_T2;
            self.t2_running = false;
        }
        self.t2_counter = counter.wrapping_sub(cycles) as u16;
    }

    /// Cycles per shifted bit, or `None` when not clocked internally.
    fn shift_period(&self) -> Option<u32> {
        match self.shift_mode() {
            // Timer 2 low byte as a free-running divider.
            0b001 | 0b100 | 0b101 => Some(2 * (u32::from(self.t2_latch_lo) + 2)),
            0b010 | 0b110 => Some(2),
            _ => None,
        }
    }

    fn start_shift(&mut self) {
        self.ifr &= !IFR_SR;
        self.sr_cycles = 0;
        self.sr_bits_left = if self.shift_mode() == SR_DISABLED { 0 } else { 8 };
    }

    fn tick_shift(&mut self, cycles: u32) {
        let Some(period) = self.shift_period() else {
            return;
        };
        let free_run = self.shift_mode() == SR_FREE_RUN;
        if self.sr_bits_left == 0 && !free_run {
            return;
        }

        self.sr_cycles += cycles;
        let mut shifts = self.sr_cycles / period;
        self.sr_cycles %= period;
        if free_run {
            // Rotation repeats every 8 bits.
            if shifts > 8 {
                shifts = 8 + shifts % 8;
            }
        } else {
            shifts = shifts.min(u32::from(self.sr_bits_left));
        }
        for _ in 0..shifts {
            self.shift_bit();
        }
        if self.sr_bits_left == 0 && !free_run {
            self.sr_cycles = 0;
        }
    }

    fn shift_bit(&mut self) {
        let mode = self.shift_mode();
        if mode & 0b100 != 0 {
            self.sr_out = self.sr & 0x80 != 0;
            self.sr = self.sr.rotate_left(1);
        } else {
            self.sr = (self.sr << 1) | u8::from(self.cb2);
        }
        if mode != SR_FREE_RUN && self.sr_bits_left > 0 {
            self.sr_bits_left -= 1;
            if self.sr_bits_left == 0 {
                self.ifr |= IFR_SR;
            }
        }
    }
}
