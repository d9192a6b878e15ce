//! Encode a whole image to GCR and read every sector back out.

use format_d64::D64;
use format_gcr::{GcrDisk, GcrTrack};

/// A 35-track image where every sector carries a distinct pattern.
fn patterned_image() -> D64 {
    let mut d64 = D64::formatted(b"ROUND TRIP", *b"RT").expect("format");
    for track in 1..=35 {
        for sector in 0..D64::sectors_per_track(track) {
            if track == 18 && sector == 0 {
                continue; // keep the BAM and its disk id
            }
            let block: Vec<u8> = (0..=255u8)
                .map(|i| i.wrapping_mul(track).wrapping_add(sector).rotate_left(3))
                .collect();
            d64.write_sector(track, sector, &block).expect("in range");
        }
    }
    d64
}

#[test]
fn every_sector_survives_encoding() {
    let d64 = patterned_image();
    let disk_id = d64.disk_id();
    let mut decoded = 0;

    for track in 1..=35 {
        let gcr = GcrTrack::build_from_disk_image(&d64, track, disk_id);
        for sector in 0..D64::sectors_per_track(track) {
            let found = gcr
                .find_sector(sector)
                .unwrap_or_else(|| panic!("{track}/{sector} missing"));
            assert!(found.header.valid, "{track}/{sector} header");
            assert_eq!(found.header.value.track, track);
            assert_eq!(found.header.value.disk_id, disk_id);
            assert!(found.data.valid, "{track}/{sector} data");
            assert_eq!(
                &found.data.value[..],
                d64.read_sector(track, sector).expect("in range"),
                "{track}/{sector}"
            );
            decoded += 1;
        }
    }

    assert_eq!(decoded, 683);
}

#[test]
fn disk_view_agrees_with_track_view() {
    let d64 = patterned_image();
    let disk = GcrDisk::from_d64(&d64);
    for track in [1, 18, 25, 35] {
        let direct = GcrTrack::build_from_disk_image(&d64, track, d64.disk_id());
        assert_eq!(disk.track(track * 2).bytes(), direct.bytes(), "track {track}");
    }
}

#[test]
fn forty_track_image_encodes_the_extra_tracks() {
    let mut raw = D64::formatted(b"FORTY", *b"40").expect("format").to_bytes();
    raw.resize(196_608, 0);
    let mut d64 = D64::from_bytes(&raw).expect("40 tracks");
    d64.write_sector(40, 16, &[0x40; 256]).expect("in range");

    let disk = GcrDisk::from_d64(&d64);
    let found = disk.track(80).find_sector(16).expect("present");
    assert!(found.data.valid);
    assert_eq!(found.data.value, [0x40; 256]);
}
