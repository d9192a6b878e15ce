//! The device side of the two 8-bit ports.

/// Whatever is wired to a VIA's ports.
///
/// Reads supply the live level of every input pin; writes deliver the
/// driven output (`ORx & DDRx`, with PB7 under timer 1 control when
/// enabled) each time it may have changed. Pins the VIA drives as outputs
/// ignore the input value.
pub trait PortClient {
    /// Live input levels on port A.
    fn read_port_a(&self) -> u8 {
        0xFF
    }

    /// Live input levels on port B.
    fn read_port_b(&self) -> u8 {
        0xFF
    }

    /// Port A output changed.
    fn write_port_a(&mut self, _output: u8) {}

    /// Port B output changed.
    fn write_port_b(&mut self, _output: u8) {}
}

/// Ports with nothing attached: inputs float high through the pull-ups.
///
/// The input levels can be set directly, and the last driven outputs are
/// kept, which makes this the client of choice for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPort {
    pub input_a: u8,
    pub input_b: u8,
    pub output_a: u8,
    pub output_b: u8,
}

impl Default for OpenPort {
    fn default() -> Self {
        Self {
            input_a: 0xFF,
            input_b: 0xFF,
            output_a: 0,
            output_b: 0,
        }
    }
}

impl PortClient for OpenPort {
    fn read_port_a(&self) -> u8 {
        self.input_a
    }

    fn read_port_b(&self) -> u8 {
        self.input_b
    }

    fn write_port_a(&mut self, output: u8) {
        self.output_a = output;
    }

    fn write_port_b(&mut self, output: u8) {
        self.output_b = output;
    }
}
