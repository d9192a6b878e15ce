//! Drive firmware image ($C000-$FFFF).

use std::fs;
use std::path::Path;

use crate::{DriveError, Result};

/// Size of the ROM window.
pub const ROM_SIZE: usize = 0x4000;
/// Size of each half when the firmware ships as two chips.
const HALF_SIZE: usize = ROM_SIZE / 2;

/// 16 KB drive firmware.
#[derive(Clone)]
pub struct DriveRom {
    data: Vec<u8>,
}

impl std::fmt::Debug for DriveRom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveRom")
            .field("reset_vector", &format_args!("{:#06X}", self.reset_vector()))
            .finish()
    }
}

impl DriveRom {
    /// A contiguous 16 KB image.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != ROM_SIZE {
            return Err(DriveError::RomSize(data.len()));
        }
        Ok(Self {
            data: data.to_vec(),
        })
    }

    /// Two 8 KB images: $C000-$DFFF and $E000-$FFFF.
    pub fn from_halves(low: &[u8], high: &[u8]) -> Result<Self> {
        if low.len() != HALF_SIZE || high.len() != HALF_SIZE {
            return Err(DriveError::RomHalfSize {
                low: low.len(),
                high: high.len(),
            });
        }
        let mut data = Vec::with_capacity(ROM_SIZE);
        data.extend_from_slice(low);
        data.extend_from_slice(high);
        Ok(Self { data })
    }

    /// Load a contiguous image from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Load the two halves from separate files.
    pub fn load_halves(low: impl AsRef<Path>, high: impl AsRef<Path>) -> Result<Self> {
        Self::from_halves(&fs::read(low)?, &fs::read(high)?)
    }

    /// Byte at a CPU address in $C000-$FFFF. Lower addresses wrap.
    #[must_use]
    pub fn read(&self, address: u16) -> u8 {
        self.data[address as usize & (ROM_SIZE - 1)]
    }

    /// Contents of $FFFC/$FFFD.
    #[must_use]
    pub fn reset_vector(&self) -> u16 {
        u16::from_le_bytes([self.read(0xFFFC), self.read(0xFFFD)])
    }
}
