use strand_archive::ArchiveError;
use strand_types::Cid;

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// Bytes do not hash to the address they were offered under.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: Cid, computed: Cid },

    /// Block bytes do not decode into the requested type.
    #[error("cannot decode block {cid}: {reason}")]
    Decode { cid: Cid, reason: String },

    /// A value could not be encoded into a block.
    #[error("cannot encode block: {0}")]
    Encode(String),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
