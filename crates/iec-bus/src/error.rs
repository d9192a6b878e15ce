use thiserror::Error;

use crate::DeviceId;

pub type Result<T> = std::result::Result<T, BusError>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("device number {0} is outside 8-11")]
    Device(u8),

    #[error("device {0} is already attached")]
    Attached(DeviceId),

    #[error("device {0} is not attached")]
    NotAttached(DeviceId),

    #[error("invalid bus configuration: {0}")]
    Config(String),

    #[error("drive {device} did not {what} within {timeout_ms} ms")]
    Timeout {
        device: DeviceId,
        what: &'static str,
        timeout_ms: u64,
    },

    #[error("drive {device}: {message}")]
    Remote { device: DeviceId, message: String },

    #[error("malformed command: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("shared segment: {0}")]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Drive(#[from] drive_1541::DriveError),

    #[error(transparent)]
    Disk(#[from] format_d64::D64Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to set up the memory shared with a drive process.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segment is {found} bytes, expected {expected}")]
    Size { expected: usize, found: u64 },

    #[error("bad segment magic {0:#010X}")]
    Magic(u32),

    #[error("mmap failed: {0}")]
    Map(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
