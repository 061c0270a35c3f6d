//! Error types for the diff crate.

use strand_types::Cid;

/// Errors that can occur while diffing snapshots.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiffError {
    /// A key changed to an address that the commit did not report as new.
    #[error("{key} changed to {cid}, which the commit does not introduce")]
    UnreportedCid { key: String, cid: Cid },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
