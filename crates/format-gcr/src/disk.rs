//! The full set of GCR tracks for one inserted disk.

use format_d64::D64;

use crate::{GcrTrack, track_capacity};

/// Lowest head position, in half-tracks (track 1).
pub const MIN_HALF_TRACK: u8 = 2;
/// Highest head position, in half-tracks (track 42).
pub const MAX_HALF_TRACK: u8 = 84;

/// GCR tracks indexed by half-track.
///
/// Whole tracks the image holds are encoded; half-tracks and tracks past
/// the end of the image are unformatted.
#[derive(Debug, Clone)]
pub struct GcrDisk {
    tracks: Vec<GcrTrack>,
    disk_id: [u8; 2],
}

impl GcrDisk {
    /// Encode every track of an image, using the disk ID from its BAM.
    #[must_use]
    pub fn from_d64(image: &D64) -> Self {
        let disk_id = image.disk_id();
        let tracks = (MIN_HALF_TRACK..=MAX_HALF_TRACK)
            .map(|half_track| {
                let track = half_track / 2;
                if half_track % 2 == 0 {
                    GcrTrack::build_from_disk_image(image, track, disk_id)
                } else {
                    GcrTrack::unformatted(track_capacity(track))
                }
            })
            .collect();
        log::debug!(
            "encoded {} tracks, disk id {:02X}{:02X}",
            image.tracks(),
            disk_id[0],
            disk_id[1]
        );
        Self { tracks, disk_id }
    }

    /// Disk ID written into every header.
    #[must_use]
    pub fn disk_id(&self) -> [u8; 2] {
        self.disk_id
    }

    /// Track under a head at `half_track` (clamped to the head range).
    #[must_use]
    pub fn track(&self, half_track: u8) -> &GcrTrack {
        &self.tracks[Self::index(half_track)]
    }

    /// Mutable track under a head at `half_track` (clamped to the head range).
    pub fn track_mut(&mut self, half_track: u8) -> &mut GcrTrack {
        &mut self.tracks[Self::index(half_track)]
    }

    /// Re-encode one sector after the image changed.
    pub fn update_sector(&mut self, image: &D64, track: u8, sector: u8) {
        let disk_id = self.disk_id;
        self.track_mut(track * 2)
            .update_sector_from_disk_image(image, track, sector, disk_id);
    }

    /// Use a new disk ID for every track encoded from now on.
    pub fn set_disk_id(&mut self, disk_id: [u8; 2]) {
        self.disk_id = disk_id;
    }

    /// Re-encode a whole track from the image, keeping the cursor.
    pub fn rebuild_track(&mut self, image: &D64, track: u8) {
        let disk_id = self.disk_id;
        let slot = self.track_mut(track * 2);
        let position = slot.position();
        *slot = GcrTrack::build_from_disk_image(image, track, disk_id);
        slot.seek(position);
    }

    fn index(half_track: u8) -> usize {
        (half_track.clamp(MIN_HALF_TRACK, MAX_HALF_TRACK) - MIN_HALF_TRACK) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SECTOR_STRIDE;

    #[test]
    fn half_tracks_are_blank() {
        let d64 = D64::formatted(b"HALF", *b"HT").expect("format");
        let disk = GcrDisk::from_d64(&d64);
        assert_eq!(disk.disk_id(), *b"HT");
        assert!(disk.track(2).find_sector(0).is_some());
        assert!(disk.track(3).bytes().iter().all(|&b| b == 0));
        assert!(disk.track(72).bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn out_of_range_half_tracks_clamp() {
        let d64 = D64::formatted(b"CLAMP", *b"00").expect("format");
        let disk = GcrDisk::from_d64(&d64);
        assert_eq!(disk.track(0), disk.track(2));
        assert_eq!(disk.track(200), disk.track(MAX_HALF_TRACK));
    }

    #[test]
    fn update_sector_reaches_the_right_track() {
        let mut d64 = D64::formatted(b"UPD", *b"00").expect("format");
        let mut disk = GcrDisk::from_d64(&d64);
        d64.write_sector(18, 4, &[0x99; 256]).expect("in range");
        disk.update_sector(&d64, 18, 4);
        let found = disk.track(36).find_sector(4).expect("present");
        assert_eq!(found.data.value, [0x99; 256]);
        assert_eq!(found.data_offset / SECTOR_STRIDE, 4);
    }

    #[test]
    fn rebuild_uses_new_id_and_keeps_cursor() {
        let d64 = D64::formatted(b"NEWID", *b"00").expect("format");
        let mut disk = GcrDisk::from_d64(&d64);
        disk.track_mut(2).seek(1234);
        disk.set_disk_id(*b"ZZ");
        disk.rebuild_track(&d64, 1);
        assert_eq!(disk.track(2).position(), 1234);
        let found = disk.track(2).find_sector(0).expect("present");
        assert_eq!(found.header.value.disk_id, *b"ZZ");
        // Other tracks keep the old ID until rebuilt.
        let found = disk.track(4).find_sector(0).expect("present");
        assert_eq!(found.header.value.disk_id, *b"00");
    }
}
