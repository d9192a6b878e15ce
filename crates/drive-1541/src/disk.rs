//! VIA2 side of the drive: head, stepper, spindle and the GCR byte stream.
//!
//! Port A carries the GCR byte under the head (read) or the byte to write.
//! Port B:
//!
//! | Bit | Dir | Function                                  |
//! |-----|-----|-------------------------------------------|
//! | 0-1 | out | Stepper phase                             |
//! | 2   | out | Spindle motor                             |
//! | 3   | out | Activity LED                              |
//! | 4   | in  | Write protect sense (0 = protected)       |
//! | 5-6 | out | Density select                            |
//! | 7   | in  | SYNC (0 = head over a sync run)           |

use format_d64::D64;
use format_gcr::{
    GcrDisk, GcrTrack, MAX_HALF_TRACK, MIN_HALF_TRACK, SYNC_BYTE, cycles_per_byte,
};
use mos_via_6522::PortClient;

use crate::config::TraceFlags;

const MOTOR: u8 = 0x04;
const LED: u8 = 0x08;
const WRITE_PROTECT_SENSE: u8 = 0x10;
const NOT_SYNC: u8 = 0x80;

/// Half-track the head rests on at power-on (track 18).
const HOME_HALF_TRACK: u8 = 36;

/// The disk mechanics and read/write electronics.
#[derive(Debug, Clone)]
pub struct DiskController {
    image: Option<D64>,
    gcr: Option<GcrDisk>,

    half_track: u8,
    /// Last stepper phase driven on PB0-PB1.
    phase: u8,
    motor: bool,
    led: bool,
    density: u8,
    write_protect: bool,
    trace: TraceFlags,

    /// Last byte read from the head.
    data: u8,
    /// Port A output, written on each byte period in write mode.
    write_value: u8,
    /// Head is inside a run of sync bytes.
    in_sync: bool,
    /// Cycles accumulated towards the next byte.
    rotation: u32,

    writing: bool,
    /// Track offset where the current write began.
    write_start: usize,
    /// Bytes written since entering write mode.
    write_len: usize,
}

impl DiskController {
    #[must_use]
    pub fn new(write_protect: bool, trace: TraceFlags) -> Self {
        Self {
            image: None,
            gcr: None,
            half_track: HOME_HALF_TRACK,
            phase: 0,
            motor: false,
            led: false,
            density: 0,
            write_protect,
            trace,
            data: 0,
            write_value: 0,
            in_sync: false,
            rotation: 0,
            writing: false,
            write_start: 0,
            write_len: 0,
        }
    }

    /// Insert a disk, replacing any disk already in the drive.
    pub fn insert(&mut self, image: D64) -> Option<D64> {
        let previous = self.eject();
        let gcr = GcrDisk::from_d64(&image);
        log::info!(
            "disk inserted: \"{}\" ({} tracks)",
            String::from_utf8_lossy(image.disk_name()),
            image.tracks()
        );
        self.image = Some(image);
        self.gcr = Some(gcr);
        previous
    }

    /// Remove the disk. A write in progress is committed first.
    pub fn eject(&mut self) -> Option<D64> {
        if self.writing {
            self.finish_write();
            self.writing = false;
        }
        self.gcr = None;
        self.in_sync = false;
        self.rotation = 0;
        let image = self.image.take();
        if image.is_some() {
            log::info!("disk ejected");
        }
        image
    }

    /// The inserted disk image, as modified by writes.
    #[must_use]
    pub fn disk(&self) -> Option<&D64> {
        self.image.as_ref()
    }

    /// GCR view of the inserted disk.
    #[must_use]
    pub fn gcr(&self) -> Option<&GcrDisk> {
        self.gcr.as_ref()
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.image.is_some()
    }

    pub fn set_write_protect(&mut self, protect: bool) {
        self.write_protect = protect;
    }

    #[must_use]
    pub fn write_protect(&self) -> bool {
        self.write_protect
    }

    /// Head position in half-tracks (2 = track 1).
    #[must_use]
    pub fn half_track(&self) -> u8 {
        self.half_track
    }

    /// Whole track under the head (rounded down on half-tracks).
    #[must_use]
    pub fn track(&self) -> u8 {
        self.half_track / 2
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor
    }

    #[must_use]
    pub fn led_on(&self) -> bool {
        self.led
    }

    /// Density select bits (PB5-PB6).
    #[must_use]
    pub fn density(&self) -> u8 {
        self.density
    }

    #[must_use]
    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    #[must_use]
    pub fn writing(&self) -> bool {
        self.writing
    }

    /// Restore mechanical state after the VIA reset released its outputs.
    ///
    /// The head does not move on reset.
    pub fn settle(&mut self, half_track: u8) {
        self.half_track = half_track;
        self.phase = 0;
    }

    /// Switch between reading and writing (VIA2 CB2 low = write).
    ///
    /// Leaving write mode decodes what was written back into the image.
    pub fn set_write_mode(&mut self, writing: bool) {
        if writing == self.writing {
            return;
        }
        if writing {
            self.write_start = self.current_track().map_or(0, GcrTrack::position);
            self.write_len = 0;
            self.in_sync = false;
        } else {
            self.finish_write();
        }
        self.writing = writing;
        if self.trace.contains(TraceFlags::WRITES) {
            log::trace!(
                "{} mode on half-track {}",
                if writing { "write" } else { "read" },
                self.half_track
            );
        }
    }

    /// Let `cycles` pass under the head; returns the bytes now due.
    pub fn rotate(&mut self, cycles: u32) -> u32 {
        if !self.motor || self.gcr.is_none() {
            self.rotation = 0;
            return 0;
        }
        let per_byte = cycles_per_byte(self.track());
        self.rotation += cycles;
        let due = self.rotation / per_byte;
        self.rotation %= per_byte;
        due
    }

    /// Move one byte past the head. Returns whether byte-ready fires.
    ///
    /// Reading: a run of two or more sync bytes is silent until the first
    /// byte after it, which fires. A lone sync byte fires like any data byte.
    /// Writing: every byte period fires.
    pub fn step_byte(&mut self) -> bool {
        let half_track = self.half_track;
        let trace = self.trace;
        let Some(gcr) = self.gcr.as_mut() else {
            return false;
        };
        let track = gcr.track_mut(half_track);

        if self.writing {
            if self.write_protect {
                track.read_byte();
            } else {
                track.write_byte(self.write_value);
            }
            self.write_len += 1;
            return true;
        }

        let byte = track.read_byte();
        self.data = byte;
        if trace.contains(TraceFlags::BYTES) {
            log::trace!("gcr {byte:02X} at {}", track.position());
        }

        if byte != SYNC_BYTE {
            if self.in_sync && trace.contains(TraceFlags::SYNC) {
                log::trace!("sync end on half-track {half_track}");
            }
            self.in_sync = false;
            return true;
        }
        if self.in_sync {
            return false;
        }
        if track.is_sync() {
            if trace.contains(TraceFlags::SYNC) {
                log::trace!("sync start on half-track {half_track}");
            }
            self.in_sync = true;
            return false;
        }
        true
    }

    fn current_track(&self) -> Option<&GcrTrack> {
        self.gcr.as_ref().map(|gcr| gcr.track(self.half_track))
    }

    fn step_head(&mut self, phase: u8) {
        let target = match phase.wrapping_sub(self.phase) & 0x03 {
            1 => self.half_track.saturating_add(1),
            3 => self.half_track.saturating_sub(1),
            _ => self.half_track,
        }
        .clamp(MIN_HALF_TRACK, MAX_HALF_TRACK);
        self.phase = phase;
        if target == self.half_track {
            return;
        }

        if let Some(gcr) = self.gcr.as_mut() {
            let from = gcr.track(self.half_track);
            let (position, old_len) = (from.position(), from.len());
            let to = gcr.track_mut(target);
            let new_len = to.len();
            to.seek(position * new_len / old_len);
        }
        self.in_sync = false;
        if self.trace.contains(TraceFlags::STEPPER) {
            log::trace!("head {} -> {}", self.half_track, target);
        }
        self.half_track = target;
    }

    /// Decode the bytes written since entering write mode and store every
    /// intact sector into the image.
    fn finish_write(&mut self) {
        let len = std::mem::take(&mut self.write_len);
        if len == 0 || self.write_protect {
            return;
        }
        let half_track = self.half_track;
        let (Some(image), Some(gcr)) = (self.image.as_mut(), self.gcr.as_mut()) else {
            return;
        };
        if half_track % 2 != 0 {
            log::warn!("{len} bytes written on half-track {half_track} are not stored");
            return;
        }
        let track = half_track / 2;
        let span = gcr.track(half_track);
        let whole_track = len >= span.len();
        let found = span.scan_sectors(self.write_start, len);

        let mut stored = 0;
        let mut new_id = None;
        for sector in &found {
            if !sector.header.valid || sector.header.value.track != track {
                continue;
            }
            if !sector.data.valid {
                log::warn!(
                    "track {track} sector {}: written data block failed its checksum",
                    sector.header.value.sector
                );
                continue;
            }
            let number = sector.header.value.sector;
            match image.write_sector(track, number, &sector.data.value) {
                Ok(()) => {
                    stored += 1;
                    new_id.get_or_insert(sector.header.value.disk_id);
                    if !whole_track {
                        gcr.update_sector(image, track, number);
                    }
                }
                Err(err) => log::warn!("track {track} sector {number}: {err}"),
            }
        }

        if whole_track {
            if let Some(id) = new_id
                && id != gcr.disk_id()
            {
                log::debug!("disk id now {:02X}{:02X}", id[0], id[1]);
                gcr.set_disk_id(id);
            }
            gcr.rebuild_track(image, track);
        }

        if stored == 0 {
            log::warn!("track {track}: {len} written bytes held no decodable sector");
        } else if self.trace.contains(TraceFlags::WRITES) {
            log::trace!("track {track}: stored {stored} sectors from {len} bytes");
        }
    }
}

impl PortClient for DiskController {
    fn read_port_a(&self) -> u8 {
        self.data
    }

    fn read_port_b(&self) -> u8 {
        let mut value = 0x6F;
        if self.image.is_some() && !self.write_protect {
            value |= WRITE_PROTECT_SENSE;
        }
        if !self.in_sync {
            value |= NOT_SYNC;
        }
        value
    }

    fn write_port_a(&mut self, output: u8) {
        self.write_value = output;
    }

    fn write_port_b(&mut self, output: u8) {
        self.step_head(output & 0x03);

        let motor = output & MOTOR != 0;
        if motor != self.motor {
            if self.trace.contains(TraceFlags::STEPPER) {
                log::trace!("motor {}", if motor { "on" } else { "off" });
            }
            if !motor {
                self.in_sync = false;
            }
            self.motor = motor;
        }
        self.led = output & LED != 0;
        self.density = (output >> 5) & 0x03;
    }
}
