//! The memory shared between the host and one drive process.
//!
//! A small fixed layout mapped from a file by both sides. Every field is an
//! atomic. Multi-byte counters have a single writer: the host owns
//! `host_cycles`, `pending_ticks`, `lines` and `request`; the drive owns
//! `drive_cycles`, `drive_pins` and `done`. The byte-wide `control` flags
//! are set by either side.
//!
//! A batch is posted by storing its ticks and the lines to apply after
//! them, then bumping `request` with release ordering. The drive answers
//! by storing `done = request` once the batch has run. Both words are woken
//! after every store, so either side may park on them.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io;
use std::mem::size_of;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::{NonNull, null_mut};
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::wait;
use crate::{DriveOutput, Lines, SegmentError};

const MAGIC: u32 = 0x4945_4331; // "IEC1"

/// Drive process is up and serving batches.
const READY: u8 = 0x01;
/// Host wants the drive process to exit.
const SHUTDOWN: u8 = 0x02;

#[repr(C)]
struct Layout {
    magic: AtomicU32,
    lines: AtomicU8,
    drive_pins: AtomicU8,
    control: AtomicU8,
    _reserved: u8,
    host_cycles: AtomicU64,
    drive_cycles: AtomicU64,
    pending_ticks: AtomicU32,
    request: AtomicU32,
    done: AtomicU32,
}

/// Size of the backing file.
pub const SEGMENT_SIZE: usize = size_of::<Layout>();

/// One batch taken by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub sequence: u32,
    pub ticks: u32,
    /// Lines to apply once the ticks have run.
    pub lines: Lines,
}

/// A mapped segment. Unmapped on drop.
pub struct Segment {
    mapping: NonNull<Layout>,
}

// SAFETY: the mapping is only reached through `&Layout`, whose fields are
// all atomics.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Size `file` for a fresh segment, map it and initialize it.
    pub fn create(file: &File) -> Result<Self, SegmentError> {
        file.set_len(SEGMENT_SIZE as u64)?;
        let segment = Self::map(file)?;
        let layout = segment.layout();
        layout.lines.store(Lines::RELEASED.to_bits(), Ordering::Relaxed);
        layout
            .drive_pins
            .store(DriveOutput::RELEASED.to_bits(), Ordering::Relaxed);
        layout.magic.store(MAGIC, Ordering::Release);
        Ok(segment)
    }

    /// Map a segment the host created.
    pub fn open(path: &Path) -> Result<Self, SegmentError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let found = file.metadata()?.len();
        if found != SEGMENT_SIZE as u64 {
            return Err(SegmentError::Size {
                expected: SEGMENT_SIZE,
                found,
            });
        }
        let segment = Self::map(&file)?;
        let magic = segment.layout().magic.load(Ordering::Acquire);
        if magic != MAGIC {
            return Err(SegmentError::Magic(magic));
        }
        Ok(segment)
    }

    fn map(file: &File) -> Result<Self, SegmentError> {
        // SAFETY: mapping a file we hold open, shared and read-write, with
        // the length it was sized to.
        let mapping = unsafe {
            libc::mmap(
                null_mut(),
                SEGMENT_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if mapping == libc::MAP_FAILED {
            return Err(SegmentError::Map(io::Error::last_os_error()));
        }
        NonNull::new(mapping.cast::<Layout>())
            .map(|mapping| Self { mapping })
            .ok_or_else(|| SegmentError::Map(io::Error::other("mmap returned null")))
    }

    fn layout(&self) -> &Layout {
        // SAFETY: the mapping is page aligned, at least SEGMENT_SIZE long and
        // lives until drop. Every field is an atomic or never accessed, so
        // shared access from another process is sound.
        unsafe { self.mapping.as_ref() }
    }

    // Host side.

    /// Post a batch: run `ticks`, then apply `lines`. Returns its sequence.
    pub fn post(&self, ticks: u32, lines: Lines, host_cycles: u64) -> u32 {
        let layout = self.layout();
        layout.pending_ticks.store(ticks, Ordering::Relaxed);
        layout.lines.store(lines.to_bits(), Ordering::Relaxed);
        layout.host_cycles.store(host_cycles, Ordering::Relaxed);
        let sequence = layout.request.load(Ordering::Relaxed).wrapping_add(1);
        layout.request.store(sequence, Ordering::Release);
        wait::wake(&layout.request);
        sequence
    }

    #[must_use]
    pub fn is_done(&self, sequence: u32) -> bool {
        self.layout().done.load(Ordering::Acquire) == sequence
    }

    /// Wait up to `timeout` for the drive to complete `sequence`.
    pub fn wait_done(&self, sequence: u32, timeout: Duration) -> bool {
        wait::wait_for_word(&self.layout().done, timeout, |done| done == sequence)
    }

    /// Cancel ticks the drive has not picked up yet.
    pub fn drop_backlog(&self) -> u32 {
        self.layout().pending_ticks.swap(0, Ordering::AcqRel)
    }

    #[must_use]
    pub fn drive_output(&self) -> DriveOutput {
        DriveOutput::from_bits(self.layout().drive_pins.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn drive_cycles(&self) -> u64 {
        self.layout().drive_cycles.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.layout().control.load(Ordering::Acquire) & READY != 0
    }

    pub fn request_shutdown(&self) {
        let layout = self.layout();
        layout.control.fetch_or(SHUTDOWN, Ordering::Release);
        wait::wake(&layout.request);
    }

    // Drive side.

    pub fn set_ready(&self) {
        self.layout().control.fetch_or(READY, Ordering::Release);
    }

    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.layout().control.load(Ordering::Acquire) & SHUTDOWN != 0
    }

    /// The newest batch, if it differs from `last`.
    #[must_use]
    pub fn take(&self, last: u32) -> Option<Batch> {
        let layout = self.layout();
        let sequence = layout.request.load(Ordering::Acquire);
        if sequence == last {
            return None;
        }
        Some(Batch {
            sequence,
            ticks: layout.pending_ticks.swap(0, Ordering::AcqRel),
            lines: Lines::from_bits(layout.lines.load(Ordering::Relaxed)),
        })
    }

    /// Wait up to `timeout` for a batch newer than `last`.
    pub fn wait_request(&self, last: u32, timeout: Duration) -> bool {
        wait::wait_for_word(&self.layout().request, timeout, |request| request != last)
    }

    /// Publish the drive's pins and cycle count.
    pub fn publish(&self, output: DriveOutput, cycles: u64) {
        let layout = self.layout();
        layout.drive_cycles.store(cycles, Ordering::Relaxed);
        layout.drive_pins.store(output.to_bits(), Ordering::Release);
    }

    pub fn complete(&self, sequence: u32) {
        let layout = self.layout();
        layout.done.store(sequence, Ordering::Release);
        wait::wake(&layout.done);
    }

    /// Host cycles as of the last posted batch.
    #[must_use]
    pub fn host_cycles(&self) -> u64 {
        self.layout().host_cycles.load(Ordering::Relaxed)
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: the mapping is exclusively owned by this object.
        if unsafe { libc::munmap(self.mapping.as_ptr().cast(), SEGMENT_SIZE) } < 0 {
            log::error!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_mappings_share_state() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let host = Segment::create(file.as_file()).expect("create");
        let drive = Segment::open(file.path()).expect("open");

        assert!(drive.take(0).is_none());
        let lines = Lines {
            atn: false,
            clk: true,
            data: true,
        };
        let sequence = host.post(40, lines, 1000);
        let batch = drive.take(0).expect("posted");
        assert_eq!(batch.ticks, 40);
        assert_eq!(batch.lines, lines);
        assert_eq!(drive.host_cycles(), 1000);
        assert!(!host.is_done(sequence));

        let output = DriveOutput {
            clk: true,
            data: false,
        };
        drive.publish(output, 40);
        drive.complete(batch.sequence);
        assert!(host.is_done(sequence));
        assert_eq!(host.drive_output(), output);
        assert_eq!(host.drive_cycles(), 40);
        assert!(drive.take(batch.sequence).is_none());
    }

    #[test]
    fn backlog_can_be_dropped() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let host = Segment::create(file.as_file()).expect("create");
        host.post(500, Lines::RELEASED, 500);
        assert_eq!(host.drop_backlog(), 500);
        let drive = Segment::open(file.path()).expect("open");
        assert_eq!(drive.take(0).expect("posted").ticks, 0);
    }

    #[test]
    fn control_flags() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let host = Segment::create(file.as_file()).expect("create");
        let drive = Segment::open(file.path()).expect("open");
        assert!(!host.is_ready());
        drive.set_ready();
        assert!(host.is_ready());
        host.request_shutdown();
        assert!(drive.shutdown_requested());
    }

    #[test]
    fn posted_batch_wakes_a_waiting_drive() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let host = Segment::create(file.as_file()).expect("create");
        let drive = Segment::open(file.path()).expect("open");
        let waiter = std::thread::spawn(move || {
            let start = std::time::Instant::now();
            let woke = drive.wait_request(0, Duration::from_secs(10));
            let batch = drive.take(0).expect("posted");
            drive.complete(batch.sequence);
            (woke, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(50));
        let sequence = host.post(12, Lines::RELEASED, 12);
        assert!(host.wait_done(sequence, Duration::from_secs(10)));
        let (woke, elapsed) = waiter.join().expect("drive thread");
        assert!(woke);
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
        assert!(!host.wait_done(sequence + 1, Duration::from_millis(5)));
    }

    #[test]
    fn foreign_files_rejected() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        assert!(matches!(
            Segment::open(file.path()),
            Err(SegmentError::Size { found: 0, .. })
        ));
        file.as_file().set_len(SEGMENT_SIZE as u64).expect("resize");
        assert!(matches!(
            Segment::open(file.path()),
            Err(SegmentError::Magic(0))
        ));
    }
}
