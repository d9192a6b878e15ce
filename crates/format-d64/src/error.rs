use thiserror::Error;

pub type Result<T> = std::result::Result<T, D64Error>;

/// Failure to load, address or walk a D64 image.
#[derive(Debug, Error)]
pub enum D64Error {
    #[error("invalid D64 size: {0} bytes (expected 174848, 175531, 196608 or 197376)")]
    Size(usize),

    #[error("track {track} sector {sector} is outside the disk geometry")]
    NoSuchSector { track: u8, sector: u8 },

    #[error("sector data must be 256 bytes, got {0}")]
    SectorLength(usize),

    #[error("{chain} chain links to invalid track {track} sector {sector}")]
    BadLink {
        chain: &'static str,
        track: u8,
        sector: u8,
    },

    #[error("{chain} chain revisits track {track} sector {sector}")]
    ChainLoop {
        chain: &'static str,
        track: u8,
        sector: u8,
    },

    #[error("disk name must be at most 16 bytes, got {0}")]
    NameLength(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
