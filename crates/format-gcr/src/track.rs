//! One track's physical byte stream, read and written as the disk rotates.

use format_d64::D64;

use crate::codec::{
    DATA_BLOCK_LEN, DATA_MARKER, Decoded, HEADER_BLOCK_LEN, HEADER_MARKER, SectorHeader,
    decode_data, decode_group, decode_header, encode_data, encode_header,
};
use crate::{
    DATA_OFFSET, GAP_BYTE, HEADER_GAP_LEN, HEADER_OFFSET, SECTOR_GAP_LEN, SECTOR_STRIDE,
    SYNC_BYTE, SYNC_LEN, track_capacity,
};

/// A sector located in the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundSector {
    /// The header block that preceded the data block.
    pub header: Decoded<SectorHeader>,
    /// The data block.
    pub data: Decoded<[u8; 256]>,
    /// Track offset of the first data block byte.
    pub data_offset: usize,
}

/// A circular buffer of GCR bytes with a single read/write cursor.
///
/// The length never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcrTrack {
    data: Vec<u8>,
    position: usize,
}

impl GcrTrack {
    /// A blank track: all zero bytes, so no sync is ever detected.
    #[must_use]
    pub fn unformatted(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            position: 0,
        }
    }

    /// Encode every sector of `track` from the image.
    ///
    /// Tracks the image does not hold come back unformatted.
    #[must_use]
    pub fn build_from_disk_image(image: &D64, track: u8, disk_id: [u8; 2]) -> Self {
        let capacity = track_capacity(track);
        if track == 0 || track > image.tracks() {
            return Self::unformatted(capacity);
        }

        let sectors = D64::sectors_per_track(track);
        let mut data = Vec::with_capacity(capacity);
        for sector in 0..sectors {
            data.extend_from_slice(&encode_sector(image, track, sector, disk_id));
        }

        if data.len() > capacity {
            log::warn!(
                "track {track}: {} encoded bytes exceed capacity {capacity}, truncating",
                data.len()
            );
            data.truncate(capacity);
        }
        data.resize(capacity, GAP_BYTE);

        Self { data, position: 0 }
    }

    /// Track length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: a track holds at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor (wrapped into range).
    pub fn seek(&mut self, position: usize) {
        self.position = position % self.data.len();
    }

    /// Byte under the cursor, without advancing.
    #[must_use]
    pub fn peek(&self) -> u8 {
        self.data[self.position]
    }

    /// Byte `offset` places after the cursor, without advancing.
    #[must_use]
    pub fn peek_ahead(&self, offset: usize) -> u8 {
        self.at(self.position + offset)
    }

    /// Whether the byte under the cursor is a sync byte.
    ///
    /// A single byte only: callers distinguish an isolated $FF data byte
    /// from a real sync run.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.peek() == SYNC_BYTE
    }

    /// Return the byte under the cursor and advance.
    pub fn read_byte(&mut self) -> u8 {
        let value = self.data[self.position];
        self.advance();
        value
    }

    /// Store a byte under the cursor and advance.
    pub fn write_byte(&mut self, value: u8) {
        self.data[self.position] = value;
        self.advance();
    }

    /// The raw track bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Re-encode one sector in place at its fixed stride offset.
    ///
    /// The rest of the track, including the cursor, is left untouched.
    pub fn update_sector_from_disk_image(
        &mut self,
        image: &D64,
        track: u8,
        sector: u8,
        disk_id: [u8; 2],
    ) {
        if image.sector_index(track, sector).is_none() {
            log::warn!("track {track} sector {sector}: not on the image, nothing to update");
            return;
        }
        let offset = sector as usize * SECTOR_STRIDE;
        let end = offset + SECTOR_STRIDE;
        if end > self.data.len() {
            log::warn!("track {track} sector {sector}: stride ends past the track");
            return;
        }
        self.data[offset..end].copy_from_slice(&encode_sector(image, track, sector, disk_id));
    }

    /// Locate a sector the way the drive firmware does: wait for a sync,
    /// read a header, wait for the next sync, read the data block.
    ///
    /// Only headers that decode cleanly are matched; the data block is
    /// returned with its own validity.
    #[must_use]
    pub fn find_sector(&self, sector: u8) -> Option<FoundSector> {
        self.scan_sectors(0, self.data.len())
            .into_iter()
            .find(|found| found.header.valid && found.header.value.sector == sector)
    }

    /// Every data block whose first byte lies in `len` bytes from `start`,
    /// paired with the header block before it.
    ///
    /// The header may lie before `start`; a data block with no header ahead
    /// of it within one sector stride is skipped.
    #[must_use]
    pub fn scan_sectors(&self, start: usize, len: usize) -> Vec<FoundSector> {
        let size = self.data.len();
        let start = start % size;
        let span = len.min(size);
        let back = SECTOR_STRIDE.min(size);

        let mut found = Vec::new();
        let mut header = None;
        for k in 0..back + span {
            let offset = (start + size - back + k) % size;
            if !self.is_sync_end(offset) {
                continue;
            }
            match self.marker_at(offset) {
                Some(HEADER_MARKER) => {
                    header = Some(decode_header(&self.block::<HEADER_BLOCK_LEN>(offset)));
                }
                Some(DATA_MARKER) => {
                    if let Some(header) = header.take()
                        && k >= back
                    {
                        found.push(FoundSector {
                            header,
                            data: decode_data(&self.block::<DATA_BLOCK_LEN>(offset)),
                            data_offset: offset,
                        });
                    }
                }
                _ => {}
            }
        }
        found
    }

    fn advance(&mut self) {
        self.position = (self.position + 1) % self.data.len();
    }

    fn at(&self, offset: usize) -> u8 {
        self.data[offset % self.data.len()]
    }

    /// First byte after a run of at least two sync bytes.
    fn is_sync_end(&self, offset: usize) -> bool {
        let size = self.data.len();
        self.at(offset) != SYNC_BYTE
            && self.at(offset + size - 1) == SYNC_BYTE
            && self.at(offset + size - 2) == SYNC_BYTE
    }

    fn marker_at(&self, offset: usize) -> Option<u8> {
        let group = decode_group(&self.block::<5>(offset));
        group.valid.then_some(group.value[0])
    }

    /// `N` bytes from `offset`, wrapping at the end of the track.
    fn block<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.at(offset + i);
        }
        out
    }
}

/// One full sector stride: sync, header, gap, sync, data, gap.
fn encode_sector(image: &D64, track: u8, sector: u8, disk_id: [u8; 2]) -> [u8; SECTOR_STRIDE] {
    let mut out = [GAP_BYTE; SECTOR_STRIDE];
    out[..SYNC_LEN].fill(SYNC_BYTE);
    out[HEADER_OFFSET..HEADER_OFFSET + HEADER_BLOCK_LEN]
        .copy_from_slice(&encode_header(track, sector, disk_id));

    let data_sync = HEADER_OFFSET + HEADER_BLOCK_LEN + HEADER_GAP_LEN;
    out[data_sync..DATA_OFFSET].fill(SYNC_BYTE);

    let mut payload = [0u8; 256];
    if let Ok(bytes) = image.read_sector(track, sector) {
        payload.copy_from_slice(bytes);
    }
    out[DATA_OFFSET..DATA_OFFSET + DATA_BLOCK_LEN].copy_from_slice(&encode_data(&payload));
    debug_assert_eq!(DATA_OFFSET + DATA_BLOCK_LEN + SECTOR_GAP_LEN, SECTOR_STRIDE);
    out
}
