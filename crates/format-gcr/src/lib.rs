//! GCR (Group Code Recording) encoding for D64 sectors.
//!
//! The 1541 drive stores data on disk using GCR encoding: every 4 bits
//! are mapped to a unique 5-bit pattern that guarantees no more than
//! two consecutive zeros (essential for reliable clock recovery).
//!
//! Each sector on disk occupies a fixed 372-byte stride:
//!   - Sync mark: 5 bytes of $FF (40 one-bits)
//!   - Header block: 10 GCR bytes (8 raw → 10 GCR)
//!   - Header gap: 9 bytes of $55
//!   - Sync mark: 5 bytes of $FF
//!   - Data block: 325 GCR bytes (260 raw → 325 GCR)
//!   - Inter-sector gap: 18 bytes of $55
//!
//! Zone-dependent byte rate (at ~1 MHz drive CPU clock), chosen so one
//! revolution takes ~200,000 cycles (300 rpm):
//!   Zone 0 (tracks  1-17): 26 cycles/byte, 7820 bytes/track
//!   Zone 1 (tracks 18-24): 28 cycles/byte, 7170 bytes/track
//!   Zone 2 (tracks 25-30): 30 cycles/byte, 6700 bytes/track
//!   Zone 3 (tracks 31-40): 32 cycles/byte, 6300 bytes/track

mod codec;
mod disk;
mod track;

pub use codec::{
    DATA_BLOCK_LEN, DATA_MARKER, Decoded, HEADER_BLOCK_LEN, HEADER_MARKER, SectorHeader,
    decode_data, decode_group, decode_header, encode_data, encode_group, encode_header,
};
pub use disk::{GcrDisk, MAX_HALF_TRACK, MIN_HALF_TRACK};
pub use track::{FoundSector, GcrTrack};

/// Sync mark byte. Runs of it are written raw, never GCR-encoded.
pub const SYNC_BYTE: u8 = 0xFF;
/// Gap filler byte.
pub const GAP_BYTE: u8 = 0x55;
/// Sync run length written before each header and data block.
pub const SYNC_LEN: usize = 5;
/// Gap between the header block and the data sync.
pub const HEADER_GAP_LEN: usize = 9;
/// Gap after each data block.
pub const SECTOR_GAP_LEN: usize = 18;

/// Offset of the header block within a sector stride.
pub const HEADER_OFFSET: usize = SYNC_LEN;
/// Offset of the data block within a sector stride.
pub const DATA_OFFSET: usize = HEADER_OFFSET + HEADER_BLOCK_LEN + HEADER_GAP_LEN + SYNC_LEN;
/// Bytes occupied by one encoded sector.
pub const SECTOR_STRIDE: usize = DATA_OFFSET + DATA_BLOCK_LEN + SECTOR_GAP_LEN;

/// Speed zone for a given track number.
///
/// Returns the zone (0-3) which determines the bit rate. Tracks beyond 35
/// share the innermost zone.
#[must_use]
pub fn speed_zone(track: u8) -> u8 {
    match track {
        0..=17 => 0,
        18..=24 => 1,
        25..=30 => 2,
        _ => 3,
    }
}

/// Cycles per GCR byte for a given track (at ~1 MHz drive CPU clock).
#[must_use]
pub fn cycles_per_byte(track: u8) -> u32 {
    [26, 28, 30, 32][speed_zone(track) as usize]
}

/// Encoded length of a track, fixed per zone.
#[must_use]
pub fn track_capacity(track: u8) -> usize {
    [7820, 7170, 6700, 6300][speed_zone(track) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_d64::D64;

    #[test]
    fn stride_is_372() {
        assert_eq!(HEADER_OFFSET, 5);
        assert_eq!(DATA_OFFSET, 29);
        assert_eq!(SECTOR_STRIDE, 372);
    }

    #[test]
    fn speed_zone_values() {
        assert_eq!(speed_zone(1), 0);
        assert_eq!(speed_zone(17), 0);
        assert_eq!(speed_zone(18), 1);
        assert_eq!(speed_zone(24), 1);
        assert_eq!(speed_zone(25), 2);
        assert_eq!(speed_zone(30), 2);
        assert_eq!(speed_zone(31), 3);
        assert_eq!(speed_zone(35), 3);
        assert_eq!(speed_zone(40), 3);
    }

    #[test]
    fn cycles_per_byte_values() {
        assert_eq!(cycles_per_byte(1), 26);
        assert_eq!(cycles_per_byte(18), 28);
        assert_eq!(cycles_per_byte(25), 30);
        assert_eq!(cycles_per_byte(31), 32);
    }

    #[test]
    fn every_zone_fits_its_sectors() {
        for track in 1..=40 {
            let needed = D64::sectors_per_track(track) as usize * SECTOR_STRIDE;
            assert!(track_capacity(track) >= needed, "track {track}");
        }
    }

    #[test]
    fn revolution_is_close_to_300_rpm() {
        for track in [1, 18, 25, 31] {
            let rev = track_capacity(track) as u32 * cycles_per_byte(track);
            assert!((200_000..=204_000).contains(&rev), "track {track}: {rev}");
        }
    }

    #[test]
    fn outer_zones_hold_more_bytes() {
        assert!(track_capacity(1) > track_capacity(18));
        assert!(track_capacity(18) > track_capacity(25));
        assert!(track_capacity(25) > track_capacity(31));
    }
}
