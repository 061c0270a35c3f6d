use strand_types::Cid;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("invalid archive magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    #[error("archive checksum mismatch")]
    ChecksumMismatch,

    #[error("CRC32 mismatch for block {cid}")]
    CrcMismatch { cid: Cid },

    #[error("archive truncated at offset {offset}: {reason}")]
    Truncated { offset: usize, reason: String },

    #[error("block of {size} bytes exceeds limit of {limit}")]
    BlockTooLarge { size: usize, limit: usize },
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
