use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrtError>;

/// A CRT file that cannot be parsed.
#[derive(Debug, Error)]
pub enum CrtError {
    #[error("CRT file too short for header: {0} bytes")]
    TooShort(usize),

    #[error("invalid CRT signature")]
    Signature,

    #[error("invalid CRT header length: {0}")]
    HeaderLength(usize),

    #[error("expected CHIP signature at offset {offset}, got {found:02X?}")]
    ChipSignature { offset: usize, found: [u8; 4] },

    #[error("invalid CHIP packet length {length} at offset {offset}")]
    ChipLength { offset: usize, length: usize },

    #[error("CHIP ROM data extends past end of packet at offset {offset}")]
    ChipData { offset: usize },

    #[error("CRT file contains no CHIP packets")]
    NoChips,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
