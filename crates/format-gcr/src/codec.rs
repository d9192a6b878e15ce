//! 4-to-5 group coding and the header/data block records built on it.

/// 4-bit to 5-bit GCR encoding table.
const GCR_ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17,
    0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

/// Marks a 5-bit pattern that no nibble encodes to.
const INVALID: u8 = 0xFF;

/// 5-bit to 4-bit GCR decoding table (inverse of `GCR_ENCODE`).
const GCR_DECODE: [u8; 32] = [
    INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, // 00-07
    INVALID, 0x08, 0x00, 0x01, INVALID, 0x0C, 0x04, 0x05, // 08-0F
    INVALID, INVALID, 0x02, 0x03, INVALID, 0x0F, 0x06, 0x07, // 10-17
    INVALID, 0x09, 0x0A, 0x0B, INVALID, 0x0D, 0x0E, INVALID, // 18-1F
];

/// First raw byte of a header block.
pub const HEADER_MARKER: u8 = 0x08;
/// First raw byte of a data block.
pub const DATA_MARKER: u8 = 0x07;
/// Padding in the last two raw header bytes.
const HEADER_PAD: u8 = 0x0F;

/// GCR length of a header block (8 raw bytes).
pub const HEADER_BLOCK_LEN: usize = 10;
/// GCR length of a data block (260 raw bytes).
pub const DATA_BLOCK_LEN: usize = 325;

/// A decoded value plus whether it decoded cleanly.
///
/// Corrupt or foreign data is reported through `valid`, never as an error:
/// the drive simply finds no usable data on this revolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub valid: bool,
}

/// Fields of a sector header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorHeader {
    pub track: u8,
    pub sector: u8,
    /// Disk ID in BAM order: `[id1, id2]`.
    pub disk_id: [u8; 2],
}

/// Encode 4 raw bytes into 5 GCR bytes.
///
/// Each nibble maps to a 5-bit GCR code. Four bytes = eight nibbles =
/// 40 GCR bits = 5 GCR bytes, packed msb first.
#[must_use]
pub fn encode_group(input: &[u8; 4]) -> [u8; 5] {
    let n: [u8; 8] = [
        GCR_ENCODE[(input[0] >> 4) as usize],
        GCR_ENCODE[(input[0] & 0x0F) as usize],
        GCR_ENCODE[(input[1] >> 4) as usize],
        GCR_ENCODE[(input[1] & 0x0F) as usize],
        GCR_ENCODE[(input[2] >> 4) as usize],
        GCR_ENCODE[(input[2] & 0x0F) as usize],
        GCR_ENCODE[(input[3] >> 4) as usize],
        GCR_ENCODE[(input[3] & 0x0F) as usize],
    ];

    [
        (n[0] << 3) | (n[1] >> 2),
        (n[1] << 6) | (n[2] << 1) | (n[3] >> 4),
        (n[3] << 4) | (n[4] >> 1),
        (n[4] << 7) | (n[5] << 2) | (n[6] >> 3),
        (n[6] << 5) | n[7],
    ]
}

/// Decode 5 GCR bytes into 4 raw bytes.
///
/// Codes outside the 16 valid patterns decode as nibble 0 and clear `valid`.
#[must_use]
pub fn decode_group(input: &[u8; 5]) -> Decoded<[u8; 4]> {
    let codes = [
        (input[0] >> 3) & 0x1F,
        ((input[0] << 2) | (input[1] >> 6)) & 0x1F,
        (input[1] >> 1) & 0x1F,
        ((input[1] << 4) | (input[2] >> 4)) & 0x1F,
        ((input[2] << 1) | (input[3] >> 7)) & 0x1F,
        (input[3] >> 2) & 0x1F,
        ((input[3] << 3) | (input[4] >> 5)) & 0x1F,
        input[4] & 0x1F,
    ];

    let mut valid = true;
    let mut nibbles = [0u8; 8];
    for (nibble, &code) in nibbles.iter_mut().zip(&codes) {
        let decoded = GCR_DECODE[code as usize];
        if decoded == INVALID {
            log::debug!("invalid GCR code {code:#04x} in group {input:02x?}");
            valid = false;
        } else {
            *nibble = decoded;
        }
    }

    Decoded {
        value: [
            (nibbles[0] << 4) | nibbles[1],
            (nibbles[2] << 4) | nibbles[3],
            (nibbles[4] << 4) | nibbles[5],
            (nibbles[6] << 4) | nibbles[7],
        ],
        valid,
    }
}

fn encode_raw<const RAW: usize, const GCR: usize>(raw: &[u8; RAW]) -> [u8; GCR] {
    let mut out = [0u8; GCR];
    for (src, dst) in raw.chunks_exact(4).zip(out.chunks_exact_mut(5)) {
        dst.copy_from_slice(&encode_group(&[src[0], src[1], src[2], src[3]]));
    }
    out
}

fn decode_raw<const RAW: usize, const GCR: usize>(gcr: &[u8; GCR]) -> Decoded<[u8; RAW]> {
    let mut raw = [0u8; RAW];
    let mut valid = true;
    for (src, dst) in gcr.chunks_exact(5).zip(raw.chunks_exact_mut(4)) {
        let group = decode_group(&[src[0], src[1], src[2], src[3], src[4]]);
        valid &= group.valid;
        dst.copy_from_slice(&group.value);
    }
    Decoded { value: raw, valid }
}

fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

/// Encode a sector header block.
///
/// Raw header: $08, checksum, sector, track, id2, id1, $0F, $0F.
#[must_use]
pub fn encode_header(track: u8, sector: u8, disk_id: [u8; 2]) -> [u8; HEADER_BLOCK_LEN] {
    let checksum = sector ^ track ^ disk_id[0] ^ disk_id[1];
    let raw: [u8; 8] = [
        HEADER_MARKER,
        checksum,
        sector,
        track,
        disk_id[1],
        disk_id[0],
        HEADER_PAD,
        HEADER_PAD,
    ];
    encode_raw(&raw)
}

/// Decode a sector header block.
///
/// Valid only when every code decodes, the marker is $08 and the checksum
/// matches.
#[must_use]
pub fn decode_header(gcr: &[u8; HEADER_BLOCK_LEN]) -> Decoded<SectorHeader> {
    let raw: Decoded<[u8; 8]> = decode_raw(gcr);
    let [marker, checksum, sector, track, id2, id1, _, _] = raw.value;
    let header = SectorHeader {
        track,
        sector,
        disk_id: [id1, id2],
    };
    Decoded {
        value: header,
        valid: raw.valid && marker == HEADER_MARKER && checksum == track ^ sector ^ id1 ^ id2,
    }
}

/// Encode a sector data block.
///
/// Raw: $07, 256 data bytes, checksum, $00, $00 = 260 bytes = 65 groups.
#[must_use]
pub fn encode_data(sector_data: &[u8; 256]) -> [u8; DATA_BLOCK_LEN] {
    let mut raw = [0u8; 260];
    raw[0] = DATA_MARKER;
    raw[1..257].copy_from_slice(sector_data);
    raw[257] = xor_checksum(sector_data);
    encode_raw(&raw)
}

/// Decode a sector data block.
///
/// Valid only when every code decodes, the marker is $07, the checksum
/// matches and both trailing pad bytes are zero.
#[must_use]
pub fn decode_data(gcr: &[u8; DATA_BLOCK_LEN]) -> Decoded<[u8; 256]> {
    let raw: Decoded<[u8; 260]> = decode_raw(gcr);
    let mut data = [0u8; 256];
    data.copy_from_slice(&raw.value[1..257]);
    let valid = raw.valid
        && raw.value[0] == DATA_MARKER
        && raw.value[257] == xor_checksum(&data)
        && raw.value[258..] == [0, 0];
    Decoded { value: data, valid }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn gcr_group_encode_known_values() {
        // Encode [0x00, 0x00, 0x00, 0x00] → all GCR(0)=0x0A → 40 bits of 01010
        let result = encode_group(&[0x00, 0x00, 0x00, 0x00]);
        // 01010_01010_01010_01010_01010_01010_01010_01010
        assert_eq!(result, [0x52, 0x94, 0xA5, 0x29, 0x4A]);
    }

    #[test]
    fn gcr_group_encode_all_ff() {
        // GCR(F)=0x15: 10101_10101_...
        let result = encode_group(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(result, [0xAD, 0x6B, 0x5A, 0xD6, 0xB5]);
    }

    #[test]
    fn invalid_code_decodes_as_zero_nibble() {
        // First code 00000 is invalid; the rest are GCR(0).
        let mut gcr = encode_group(&[0x00, 0x00, 0x00, 0x00]);
        gcr[0] &= 0x07;
        let d = decode_group(&gcr);
        assert!(!d.valid);
        assert_eq!(d.value, [0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn sync_byte_is_never_a_data_pattern() {
        // Ten one-bits in a row cannot come out of the encoder.
        for code in GCR_ENCODE {
            assert_ne!(code, 0x1F);
        }
        assert_eq!(GCR_DECODE[0x1F], INVALID);
    }

    #[test]
    fn header_layout() {
        let gcr = encode_header(18, 3, [0x41, 0x42]);
        let raw: Decoded<[u8; 8]> = decode_raw(&gcr);
        assert!(raw.valid);
        assert_eq!(
            raw.value,
            [0x08, 18 ^ 3 ^ 0x41 ^ 0x42, 3, 18, 0x42, 0x41, 0x0F, 0x0F]
        );
    }

    #[test]
    fn foreign_header_checksum_fails() {
        let mut raw: [u8; 8] = decode_raw(&encode_header(1, 0, *b"AB")).value;
        raw[1] ^= 0x01;
        let d = decode_header(&encode_raw(&raw));
        assert!(!d.valid);
        assert_eq!(d.value.track, 1);
    }

    #[test]
    fn wrong_marker_fails() {
        let mut raw: [u8; 260] = decode_raw(&encode_data(&[0x11; 256])).value;
        raw[0] = HEADER_MARKER;
        assert!(!decode_data(&encode_raw(&raw)).valid);
    }

    #[test]
    fn data_block_checksum_byte() {
        let mut data = [0u8; 256];
        data[0] = 0xAB;
        data[1] = 0xCD;
        let raw: [u8; 260] = decode_raw(&encode_data(&data)).value;
        assert_eq!(raw[0], DATA_MARKER);
        assert_eq!(raw[257], 0xAB ^ 0xCD);
        assert_eq!(&raw[258..], &[0, 0]);
    }

    #[test]
    fn inverting_any_encoded_byte_is_detected() {
        let encoded = encode_data(&[0u8; 256]);
        for i in 0..DATA_BLOCK_LEN {
            let mut corrupt = encoded;
            corrupt[i] ^= 0xFF;
            assert!(!decode_data(&corrupt).valid, "byte {i}");
        }
    }

    /// Longest run of zero bits in the low `width` bits of `bits`.
    fn longest_zero_run(bits: u64, width: u32) -> u32 {
        let mut run = 0;
        let mut best = 0;
        for i in (0..width).rev() {
            if bits >> i & 1 == 0 {
                run += 1;
                best = best.max(run);
            } else {
                run = 0;
            }
        }
        best
    }

    proptest! {
        #[test]
        fn group_round_trip(input in any::<[u8; 4]>()) {
            let d = decode_group(&encode_group(&input));
            prop_assert!(d.valid);
            prop_assert_eq!(d.value, input);
        }

        #[test]
        fn no_code_has_three_zeros(input in any::<[u8; 4]>()) {
            let gcr = encode_group(&input);
            let bits = gcr.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            for i in 0..8 {
                let code = (bits >> (35 - i * 5)) & 0x1F;
                prop_assert!(longest_zero_run(code, 5) <= 2, "code {:05b}", code);
            }
        }

        #[test]
        fn header_round_trip(track in 1u8..=40, sector in 0u8..21, id in any::<[u8; 2]>()) {
            let d = decode_header(&encode_header(track, sector, id));
            prop_assert!(d.valid);
            prop_assert_eq!(d.value, SectorHeader { track, sector, disk_id: id });
        }

        #[test]
        fn data_round_trip(data in prop::collection::vec(any::<u8>(), 256)) {
            let mut sector = [0u8; 256];
            sector.copy_from_slice(&data);
            let d = decode_data(&encode_data(&sector));
            prop_assert!(d.valid);
            prop_assert_eq!(d.value, sector);
        }
    }
}
