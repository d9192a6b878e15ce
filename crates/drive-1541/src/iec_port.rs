//! VIA1 port B: the serial bus side of the drive.
//!
//! | Bit | Dir | Function                                        |
//! |-----|-----|-------------------------------------------------|
//! | 0   | in  | DATA IN (1 = line low)                          |
//! | 1   | out | DATA OUT (1 = pull line low)                    |
//! | 2   | in  | CLK IN (1 = line low)                           |
//! | 3   | out | CLK OUT (1 = pull line low)                     |
//! | 4   | out | ATNA, auto-acknowledge of ATN                   |
//! | 5-6 | in  | Device number jumpers (device - 8)              |
//! | 7   | in  | ATN IN (1 = line low)                           |
//!
//! The drive's outputs pass through inverting buffers, and DATA is also
//! pulled low by the auto-acknowledge gate whenever ATN IN differs from
//! ATNA. Port A (parallel cable) is unconnected.

use mos_via_6522::PortClient;

use crate::config::TraceFlags;

const DATA_IN: u8 = 0x01;
const DATA_OUT: u8 = 0x02;
const CLK_IN: u8 = 0x04;
const CLK_OUT: u8 = 0x08;
const ATN_ACK: u8 = 0x10;
const ATN_IN: u8 = 0x80;

/// Serial bus pins as seen by VIA1.
#[derive(Debug, Clone)]
pub struct IecPort {
    jumpers: u8,
    /// ATN asserted (line low).
    atn: bool,
    clk_low: bool,
    data_low: bool,
    /// Last driven port B output.
    output: u8,
    trace: TraceFlags,
}

impl IecPort {
    #[must_use]
    pub fn new(jumpers: u8, trace: TraceFlags) -> Self {
        Self {
            jumpers: jumpers & 0x03,
            atn: false,
            clk_low: false,
            data_low: false,
            output: 0,
            trace,
        }
    }

    /// Feed the resolved ATN line (true = released).
    pub fn set_atn(&mut self, line: bool) {
        self.atn = !line;
    }

    /// Feed the resolved CLK line (true = released).
    pub fn set_clk(&mut self, line: bool) {
        self.clk_low = !line;
    }

    /// Feed the resolved DATA line (true = released).
    pub fn set_data(&mut self, line: bool) {
        self.data_low = !line;
    }

    #[must_use]
    pub fn atn_asserted(&self) -> bool {
        self.atn
    }

    /// CLK level the drive leaves on the bus (true = released).
    #[must_use]
    pub fn clk_out(&self) -> bool {
        self.output & CLK_OUT == 0
    }

    /// DATA level the drive leaves on the bus (true = released).
    #[must_use]
    pub fn data_out(&self) -> bool {
        let acknowledge = self.atn ^ (self.output & ATN_ACK != 0);
        !(self.output & DATA_OUT != 0 || acknowledge)
    }
}

impl PortClient for IecPort {
    fn read_port_b(&self) -> u8 {
        let mut value = self.jumpers << 5;
        if self.data_low {
            value |= DATA_IN;
        }
        if self.clk_low {
            value |= CLK_IN;
        }
        if self.atn {
            value |= ATN_IN;
        }
        value
    }

    fn write_port_b(&mut self, output: u8) {
        if self.trace.contains(TraceFlags::IEC) && output != self.output {
            log::trace!(
                "iec out: clk {} data {} atna {}",
                u8::from(output & CLK_OUT != 0),
                u8::from(output & DATA_OUT != 0),
                u8::from(output & ATN_ACK != 0)
            );
        }
        self.output = output;
    }
}
