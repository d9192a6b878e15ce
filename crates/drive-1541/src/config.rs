//! Drive configuration, passed in at construction.

use serde::{Deserialize, Serialize};

use crate::{DriveError, Result};

bitflags::bitflags! {
    /// Fine-grained tracing, emitted at `trace` level when enabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TraceFlags: u32 {
        /// Every GCR byte passing the head.
        const BYTES   = 0b0_0001;
        /// Entering and leaving sync runs.
        const SYNC    = 0b0_0010;
        /// Serial bus pin changes.
        const IEC     = 0b0_0100;
        /// Head steps and motor changes.
        const STEPPER = 0b0_1000;
        /// Write mode and decoded sector writes.
        const WRITES  = 0b1_0000;
    }
}

/// Configuration for one drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Serial bus device number (8-11).
    pub device: u8,
    /// Refuse writes to the inserted disk.
    pub write_protect: bool,
    pub trace: TraceFlags,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            device: 8,
            write_protect: false,
            trace: TraceFlags::empty(),
        }
    }
}

impl DriveConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if (8..=11).contains(&self.device) {
            Ok(())
        } else {
            Err(DriveError::Device(self.device))
        }
    }

    /// Device number as seen on the address jumpers (VIA1 PB5-PB6).
    #[must_use]
    pub fn jumpers(&self) -> u8 {
        self.device.wrapping_sub(8) & 0x03
    }
}
