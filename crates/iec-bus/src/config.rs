//! Synchronization tuning shared by the threaded and multi-process buses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// How long the host waits for a drive to catch up before dropping
    /// its backlog.
    pub ack_timeout_ms: u64,
    /// How long a new drive process has to report ready.
    pub startup_timeout_ms: u64,
    /// How long a drive process has to answer a disk or reset command.
    pub command_timeout_ms: u64,
    /// Host cycles accumulated before a multi-process batch is posted.
    pub batch_cycles: u32,
    /// Largest burst a drive runs between output updates.
    pub slice_cycles: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 250,
            startup_timeout_ms: 5_000,
            command_timeout_ms: 2_000,
            batch_cycles: 64,
            slice_cycles: 16,
        }
    }
}

impl BusConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_cycles == 0 || self.slice_cycles == 0 {
            return Err(BusError::Config(
                "batch_cycles and slice_cycles must be non-zero".into(),
            ));
        }
        if self.ack_timeout_ms == 0 {
            return Err(BusError::Config("ack_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
