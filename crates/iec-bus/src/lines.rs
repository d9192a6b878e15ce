//! Line levels and the open-collector resolution rule.
//!
//! Every participant can pull a line low; a line is high only while
//! nobody pulls it. Only the host drives ATN.
//!
//! Host polarity (CIA2 port A):
//!   Output: bit = 1 pulls the line low (bit 3 = ATN, 4 = CLK, 5 = DATA)
//!   Input:  bit = 1 means the line is high (bit 6 = CLK IN, 7 = DATA IN)

use std::fmt;

use drive_1541::Drive1541;
use emu_core::Processor;
use serde::{Deserialize, Serialize};

use crate::{BusError, Result};

const ATN_BIT: u8 = 0x01;
const CLK_BIT: u8 = 0x02;
const DATA_BIT: u8 = 0x04;

/// Resolved bus levels. `true` = released (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lines {
    pub atn: bool,
    pub clk: bool,
    pub data: bool,
}

impl Lines {
    /// Nobody pulling anything.
    pub const RELEASED: Self = Self {
        atn: true,
        clk: true,
        data: true,
    };

    /// Pack into a byte: bit 0 ATN, bit 1 CLK, bit 2 DATA (1 = high).
    #[must_use]
    pub fn to_bits(self) -> u8 {
        pack(self.atn, self.clk, self.data)
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self {
            atn: bits & ATN_BIT != 0,
            clk: bits & CLK_BIT != 0,
            data: bits & DATA_BIT != 0,
        }
    }

    /// The CLK IN / DATA IN bits the host reads back on CIA2 port A.
    #[must_use]
    pub fn cia2_port_a(self) -> u8 {
        (if self.clk { 0x40 } else { 0 }) | (if self.data { 0x80 } else { 0 })
    }

    /// Feed these levels to a drive's input pins.
    pub fn apply<P: Processor>(self, drive: &mut Drive1541<P>) {
        drive.set_atn_in(self.atn);
        drive.set_clk_in(self.clk);
        drive.set_data_in(self.data);
    }
}

impl Default for Lines {
    fn default() -> Self {
        Self::RELEASED
    }
}

/// Lines the host pulls low. `true` = pulling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPins {
    pub atn: bool,
    pub clk: bool,
    pub data: bool,
}

impl HostPins {
    /// Decode the host's CIA2 port A output.
    #[must_use]
    pub fn from_cia2_port_a(output: u8) -> Self {
        Self {
            atn: output & 0x08 != 0,
            clk: output & 0x10 != 0,
            data: output & 0x20 != 0,
        }
    }
}

/// What one drive leaves on CLK and DATA. `true` = released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutput {
    pub clk: bool,
    pub data: bool,
}

impl DriveOutput {
    /// A drive that is absent or not driving anything.
    pub const RELEASED: Self = Self {
        clk: true,
        data: true,
    };

    /// Sample a drive's output pins.
    #[must_use]
    pub fn of<P: Processor>(drive: &Drive1541<P>) -> Self {
        Self {
            clk: drive.clk_out(),
            data: drive.data_out(),
        }
    }

    #[must_use]
    pub fn to_bits(self) -> u8 {
        pack(true, self.clk, self.data)
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self {
            clk: bits & CLK_BIT != 0,
            data: bits & DATA_BIT != 0,
        }
    }
}

fn pack(atn: bool, clk: bool, data: bool) -> u8 {
    (if atn { ATN_BIT } else { 0 })
        | (if clk { CLK_BIT } else { 0 })
        | (if data { DATA_BIT } else { 0 })
}

/// Combine the host's pins with every drive's output.
///
/// A line is released only if no participant pulls it.
pub fn resolve(host: HostPins, drives: impl IntoIterator<Item = DriveOutput>) -> Lines {
    drives.into_iter().fold(
        Lines {
            atn: !host.atn,
            clk: !host.clk,
            data: !host.data,
        },
        |lines, drive| Lines {
            atn: lines.atn,
            clk: lines.clk && drive.clk,
            data: lines.data && drive.data,
        },
    )
}

/// Serial bus device number, 8-11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DeviceId(u8);

impl DeviceId {
    pub const FIRST: Self = Self(8);

    pub fn new(number: u8) -> Result<Self> {
        if (8..=11).contains(&number) {
            Ok(Self(number))
        } else {
            Err(BusError::Device(number))
        }
    }

    #[must_use]
    pub fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DeviceId {
    type Error = BusError;

    fn try_from(number: u8) -> Result<Self> {
        Self::new(number)
    }
}

impl From<DeviceId> for u8 {
    fn from(id: DeviceId) -> u8 {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_participants_means_released() {
        assert_eq!(resolve(HostPins::default(), []), Lines::RELEASED);
    }

    #[test]
    fn host_port_conversions() {
        let pins = HostPins::from_cia2_port_a(0x08 | 0x20);
        assert!(pins.atn && !pins.clk && pins.data);
        let lines = resolve(pins, [DriveOutput::RELEASED]);
        assert!(!lines.atn && lines.clk && !lines.data);
        assert_eq!(lines.cia2_port_a(), 0x40);
    }

    #[test]
    fn bits_round_trip() {
        let lines = Lines {
            atn: false,
            clk: true,
            data: false,
        };
        assert_eq!(Lines::from_bits(lines.to_bits()), lines);
        let out = DriveOutput {
            clk: false,
            data: true,
        };
        assert_eq!(DriveOutput::from_bits(out.to_bits()), out);
    }

    #[test]
    fn device_range() {
        assert_eq!(DeviceId::new(9).expect("valid").number(), 9);
        assert!(matches!(DeviceId::new(7), Err(BusError::Device(7))));
        assert!(serde_json::from_str::<DeviceId>("12").is_err());
        assert_eq!(serde_json::to_string(&DeviceId::FIRST).expect("json"), "8");
    }

    proptest! {
        #[test]
        fn open_collector_law(
            host in any::<(bool, bool, bool)>(),
            drives in proptest::collection::vec(any::<(bool, bool)>(), 0..4),
        ) {
            let pins = HostPins { atn: host.0, clk: host.1, data: host.2 };
            let outputs: Vec<_> = drives
                .iter()
                .map(|&(clk, data)| DriveOutput { clk, data })
                .collect();
            let lines = resolve(pins, outputs.iter().copied());

            prop_assert_eq!(lines.atn, !pins.atn);
            prop_assert_eq!(lines.clk, !pins.clk && outputs.iter().all(|d| d.clk));
            prop_assert_eq!(lines.data, !pins.data && outputs.iter().all(|d| d.data));

            // Any single pull forces the line low whatever the others do.
            if outputs.iter().any(|d| !d.data) {
                prop_assert!(!lines.data);
            }
        }
    }
}
