//! Block availability map (track 18, sector 0).
//!
//! Layout:
//!   $00-$01: first directory block (normally 18/1)
//!   $02:     DOS version ('A')
//!   $04-$8F: one 4-byte entry per track 1-35: free count, then a 24-bit
//!            bitmap (bit set = sector free), sector 0 in bit 0 of byte 1
//!   $90-$9F: disk name, $A0-padded
//!   $A2-$A3: disk ID
//!   $A5-$A6: DOS type ("2A")

use crate::{D64, D64Error, DIRECTORY_TRACK, Result, SECTOR_SIZE, TRACK_START};

/// Byte offset of the BAM sector. Identical for 35- and 40-track images.
const BAM_OFFSET: usize = TRACK_START[DIRECTORY_TRACK as usize] * SECTOR_SIZE;
/// First per-track BAM entry.
const BAM_ENTRIES: usize = 0x04;
/// Tracks covered by the standard BAM.
const BAM_TRACKS: u8 = 35;
const NAME: usize = 0x90;
const ID: usize = 0xA2;
/// Shifted space used to pad names.
const PAD: u8 = 0xA0;

impl D64 {
    fn bam(&self) -> &[u8] {
        &self.data[BAM_OFFSET..BAM_OFFSET + SECTOR_SIZE]
    }

    /// Get the disk ID from the BAM (track 18, sector 0, bytes $A2-$A3).
    #[must_use]
    pub fn disk_id(&self) -> [u8; 2] {
        let bam = self.bam();
        [bam[ID], bam[ID + 1]]
    }

    /// Disk name with the $A0 padding stripped.
    #[must_use]
    pub fn disk_name(&self) -> &[u8] {
        let name = &self.bam()[NAME..NAME + 16];
        let end = name.iter().position(|&c| c == PAD).unwrap_or(16);
        &name[..end]
    }

    /// Free-sector count the BAM records for a track.
    ///
    /// `None` for tracks the standard BAM does not cover (0, 36-40).
    #[must_use]
    pub fn free_sectors(&self, track: u8) -> Option<u8> {
        if !(1..=BAM_TRACKS).contains(&track) {
            return None;
        }
        Some(self.bam()[BAM_ENTRIES + (track as usize - 1) * 4])
    }

    /// Whether the BAM marks a sector as free.
    #[must_use]
    pub fn is_sector_free(&self, track: u8, sector: u8) -> Option<bool> {
        if !(1..=BAM_TRACKS).contains(&track) || sector >= Self::sectors_per_track(track) {
            return None;
        }
        let entry = BAM_ENTRIES + (track as usize - 1) * 4;
        let byte = self.bam()[entry + 1 + (sector as usize >> 3)];
        Some(byte & (1 << (sector & 7)) != 0)
    }

    /// Blocks free as reported by a directory listing (directory track excluded).
    #[must_use]
    pub fn blocks_free(&self) -> u16 {
        (1..=BAM_TRACKS)
            .filter(|&t| t != DIRECTORY_TRACK)
            .filter_map(|t| self.free_sectors(t))
            .map(u16::from)
            .sum()
    }

    /// A freshly formatted 35-track image: empty directory, every sector
    /// free except the BAM and the first directory block.
    pub fn formatted(name: &[u8], id: [u8; 2]) -> Result<Self> {
        if name.len() > 16 {
            return Err(D64Error::NameLength(name.len()));
        }
        let mut d64 = Self::from_bytes(&vec![0; super::D64_SIZE_35])?;

        let mut bam = [0u8; SECTOR_SIZE];
        bam[0] = DIRECTORY_TRACK;
        bam[1] = 1;
        bam[2] = b'A';
        for track in 1..=BAM_TRACKS {
            let sectors = Self::sectors_per_track(track);
            let mut bitmap = (1u32 << sectors) - 1;
            if track == DIRECTORY_TRACK {
                bitmap &= !0b11;
            }
            let entry = BAM_ENTRIES + (track as usize - 1) * 4;
            bam[entry] = bitmap.count_ones() as u8;
            bam[entry + 1..entry + 4].copy_from_slice(&bitmap.to_le_bytes()[..3]);
        }
        bam[NAME..NAME + 16].fill(PAD);
        bam[NAME..NAME + name.len()].copy_from_slice(name);
        bam[0xA0] = PAD;
        bam[0xA1] = PAD;
        bam[ID] = id[0];
        bam[ID + 1] = id[1];
        bam[0xA4] = PAD;
        bam[0xA5] = b'2';
        bam[0xA6] = b'A';
        bam[0xA7..0xAB].fill(PAD);
        d64.write_sector(DIRECTORY_TRACK, 0, &bam)?;

        let mut dir = [0u8; SECTOR_SIZE];
        dir[1] = 0xFF;
        d64.write_sector(DIRECTORY_TRACK, 1, &dir)?;
        Ok(d64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_id_from_bam() {
        let mut raw = vec![0; crate::D64_SIZE_35];
        raw[BAM_OFFSET + 0xA2] = 0x41; // 'A'
        raw[BAM_OFFSET + 0xA3] = 0x42; // 'B'
        let d64 = D64::from_bytes(&raw).expect("valid");
        assert_eq!(d64.disk_id(), [0x41, 0x42]);
    }

    #[test]
    fn formatted_disk_has_664_blocks_free() {
        let d64 = D64::formatted(b"GAMES", *b"01").expect("format");
        assert_eq!(d64.blocks_free(), 664);
        assert_eq!(d64.disk_name(), b"GAMES");
        assert_eq!(d64.disk_id(), *b"01");
        assert_eq!(d64.free_sectors(18), Some(17));
        assert_eq!(d64.is_sector_free(18, 0), Some(false));
        assert_eq!(d64.is_sector_free(18, 1), Some(false));
        assert_eq!(d64.is_sector_free(18, 2), Some(true));
        assert_eq!(d64.is_sector_free(1, 20), Some(true));
        assert_eq!(d64.is_sector_free(1, 21), None);
        assert_eq!(d64.free_sectors(36), None);
    }

    #[test]
    fn name_too_long_rejected() {
        assert!(matches!(
            D64::formatted(&[b'X'; 17], *b"00"),
            Err(D64Error::NameLength(17))
        ));
    }
}
