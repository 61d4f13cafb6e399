use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the discus crates.
pub type DiscusResult<T> = Result<T, DiscusError>;

#[derive(Debug, Error)]
pub enum DiscusError {
    /// A decode ran past the end of its input buffer.
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("volume descriptor identifier is {found:?}, expected \"CD001\"")]
    BadMagic { found: [u8; 5] },

    #[error("unknown volume descriptor type {0}")]
    UnknownVolumeType(u8),

    #[error("little-endian and big-endian value mismatch: {lsb} != {msb}")]
    EndianMismatch { lsb: u64, msb: u64 },

    #[error("bad timestamp: {0}")]
    BadTimestamp(String),

    #[error("directory record of {0} bytes exceeds the 255-byte limit")]
    RecordTooLong(usize),

    #[error("system use entry declares {declared} bytes but only {remaining} remain")]
    ShortSystemUse { declared: usize, remaining: usize },

    /// A CE chain exceeded the recursion cap.
    #[error("too many nested continuation areas")]
    TooManyContinuations,

    #[error("descriptor chain contains no primary volume descriptor")]
    NoPrimaryVolume,

    #[error("file of {0} bytes exceeds the 4 GiB extent limit")]
    FileTooLarge(u64),

    #[error("invalid system use data: {0}")]
    InvalidSystemUse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A host filesystem error while staging or emitting, tagged with the
    /// path relative to the staging root.
    #[error("processing {}: {}", .path.display(), .source)]
    Staging {
        path: PathBuf,
        source: std::io::Error,
    },
}
