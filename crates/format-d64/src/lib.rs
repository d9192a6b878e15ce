//! D64 disk image parser.
//!
//! A D64 image contains 35 (or 40) tracks with variable sectors per track:
//!   Tracks  1-17: 21 sectors (zone 0)
//!   Tracks 18-24: 19 sectors (zone 1)
//!   Tracks 25-30: 18 sectors (zone 2)
//!   Tracks 31-40: 17 sectors (zone 3)
//!
//! Total: 683 sectors x 256 bytes = 174,848 bytes for 35 tracks, 768 sectors
//! for 40. Either may be followed by one error-code byte per sector.

mod bam;
mod directory;
mod error;

use std::fs;
use std::path::Path;

pub use directory::{DirEntry, FileType};
pub use error::{D64Error, Result};

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 256;
/// Track holding the BAM and directory.
pub const DIRECTORY_TRACK: u8 = 18;

/// Standard D64 size: 683 sectors x 256 bytes.
const D64_SIZE_35: usize = 174_848;
/// 35 tracks with error info: 683 sectors + 683 error bytes.
const D64_SIZE_35_ERRORS: usize = 175_531;
/// Extended D64 size: 768 sectors x 256 bytes.
const D64_SIZE_40: usize = 196_608;
/// 40 tracks with error info.
const D64_SIZE_40_ERRORS: usize = 197_376;

/// Highest track number any image can hold.
pub const MAX_TRACKS: u8 = 40;

/// Sectors per track, indexed by track number (1-based, so index 0 is unused).
const SECTORS_PER_TRACK: [u8; 41] = [
    0, // track 0 doesn't exist
    21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, // 1-17
    19, 19, 19, 19, 19, 19, 19, // 18-24
    18, 18, 18, 18, 18, 18, // 25-30
    17, 17, 17, 17, 17, // 31-35
    17, 17, 17, 17, 17, // 36-40
];

/// Linear index of the first sector of each track (1-indexed).
const TRACK_START: [usize; 42] = {
    let mut starts = [0usize; 42];
    let mut track = 1;
    let mut index = 0;
    while track < 42 {
        starts[track] = index;
        if track < 41 {
            index += SECTORS_PER_TRACK[track] as usize;
        }
        track += 1;
    }
    starts
};

/// A parsed D64 disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D64 {
    /// Sector data, `total_sectors() * 256` bytes.
    data: Vec<u8>,
    /// Per-sector error codes, when the image carried them.
    errors: Option<Vec<u8>>,
    /// 35 or 40.
    tracks: u8,
}

impl D64 {
    /// Parse a D64 image from raw bytes.
    ///
    /// Accepts 35- or 40-track images, with or without trailing error bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (tracks, sectors, has_errors) = match data.len() {
            D64_SIZE_35 => (35, 683, false),
            D64_SIZE_35_ERRORS => (35, 683, true),
            D64_SIZE_40 => (40, 768, false),
            D64_SIZE_40_ERRORS => (40, 768, true),
            other => return Err(D64Error::Size(other)),
        };
        let split = sectors * SECTOR_SIZE;
        let errors = has_errors.then(|| data[split..].to_vec());
        log::debug!(
            "parsed D64: {tracks} tracks{}",
            if has_errors { " with error bytes" } else { "" }
        );
        Ok(Self {
            data: data[..split].to_vec(),
            errors,
            tracks,
        })
    }

    /// Read and parse a D64 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Write the image (including error bytes, if any) to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Number of sectors on a given track (1-40).
    ///
    /// Returns 0 for invalid track numbers.
    #[must_use]
    pub fn sectors_per_track(track: u8) -> u8 {
        if (1..=MAX_TRACKS).contains(&track) {
            SECTORS_PER_TRACK[track as usize]
        } else {
            0
        }
    }

    /// Number of tracks in this image (35 or 40).
    #[must_use]
    pub fn tracks(&self) -> u8 {
        self.tracks
    }

    /// Number of sectors in this image (683 or 768).
    #[must_use]
    pub fn total_sectors(&self) -> usize {
        self.data.len() / SECTOR_SIZE
    }

    /// Linear sector index (0-based) of a track/sector pair on this image.
    #[must_use]
    pub fn sector_index(&self, track: u8, sector: u8) -> Option<usize> {
        if !(1..=self.tracks).contains(&track) || sector >= SECTORS_PER_TRACK[track as usize] {
            return None;
        }
        Some(TRACK_START[track as usize] + sector as usize)
    }

    /// Byte offset of a given sector within the image.
    #[must_use]
    pub fn sector_offset(&self, track: u8, sector: u8) -> Option<usize> {
        self.sector_index(track, sector).map(|i| i * SECTOR_SIZE)
    }

    /// Read a 256-byte sector.
    pub fn read_sector(&self, track: u8, sector: u8) -> Result<&[u8]> {
        let offset = self
            .sector_offset(track, sector)
            .ok_or(D64Error::NoSuchSector { track, sector })?;
        Ok(&self.data[offset..offset + SECTOR_SIZE])
    }

    /// Write 256 bytes to a sector.
    pub fn write_sector(&mut self, track: u8, sector: u8, data: &[u8]) -> Result<()> {
        if data.len() != SECTOR_SIZE {
            return Err(D64Error::SectorLength(data.len()));
        }
        let offset = self
            .sector_offset(track, sector)
            .ok_or(D64Error::NoSuchSector { track, sector })?;
        self.data[offset..offset + SECTOR_SIZE].copy_from_slice(data);
        Ok(())
    }

    /// Error code recorded for a sector, if the image carries error bytes.
    ///
    /// Code 1 means "no error"; 0 is treated the same by most tools.
    #[must_use]
    pub fn error_code(&self, track: u8, sector: u8) -> Option<u8> {
        let errors = self.errors.as_ref()?;
        errors.get(self.sector_index(track, sector)?).copied()
    }

    /// Whether the image carries per-sector error bytes.
    #[must_use]
    pub fn has_error_bytes(&self) -> bool {
        self.errors.is_some()
    }

    /// Raw sector data (without error bytes).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serialise the image, appending error bytes if it had them.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if let Some(errors) = &self.errors {
            out.extend_from_slice(errors);
        }
        out
    }
}
