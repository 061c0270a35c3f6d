//! Error types for the collection crate.

use strand_types::Tid;

use crate::table::TableSize;

/// Errors that can occur during collection operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// The identifier falls below what the target shard may still accept.
    #[error("{tid} is too old: shard only accepts identifiers from {bound}")]
    Monotonicity { tid: Tid, bound: Tid },

    /// No entry exists for the identifier.
    #[error("no entry for {0}")]
    NotFound(Tid),

    /// An entry already exists for the identifier.
    #[error("entry already exists for {0}")]
    Duplicate(Tid),

    /// The table has reached the capacity of its size class.
    #[error("{size} table is full")]
    TableFull { size: TableSize },

    /// A merge was requested on tables that cannot be merged.
    #[error("invalid merge: {0}")]
    InvalidMerge(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] strand_store::StoreError),

    #[error(transparent)]
    Type(#[from] strand_types::TypeError),

    #[error(transparent)]
    Diff(#[from] strand_diff::DiffError),
}

/// Convenience alias for collection results.
pub type CollectionResult<T> = Result<T, CollectionError>;
