use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriveError>;

/// Failure to build a drive. Nothing fails once it is running.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("drive ROM must be 16384 bytes, got {0}")]
    RomSize(usize),

    #[error("drive ROM halves must be 8192 bytes each, got {low} and {high}")]
    RomHalfSize { low: usize, high: usize },

    #[error("device number {0} is outside 8-11")]
    Device(u8),

    #[error("invalid drive configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
