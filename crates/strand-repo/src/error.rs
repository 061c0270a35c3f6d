use strand_collection::CollectionError;
use strand_diff::DiffError;
use strand_store::StoreError;
use strand_types::Cid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    /// The data does not have the shape a repository requires.
    #[error("structural error: {0}")]
    Structural(String),

    /// An identifier or commit is out of order for the requested operation.
    #[error("monotonicity error: {0}")]
    Monotonicity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("repository is read-only: no signer configured")]
    ReadOnly,

    #[error("namespace {namespace} is missing {} blocks", cids.len())]
    MissingBlocks { namespace: String, cids: Vec<Cid> },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("signature error: {0}")]
    Signature(#[from] strand_crypto::SignatureError),

    #[error("collection error: {0}")]
    Collection(CollectionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] strand_archive::ArchiveError),

    #[error("config error: {0}")]
    Config(String),
}

impl RepoError {
    /// Whether retrying the same call could succeed.
    ///
    /// Only backend I/O failures are transient; everything else is a
    /// property of the inputs or of the stored data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::Store(StoreError::Io(_)))
    }
}

impl From<CollectionError> for RepoError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::Monotonicity { .. } => RepoError::Monotonicity(err.to_string()),
            CollectionError::NotFound(_) => RepoError::NotFound(err.to_string()),
            CollectionError::Diff(diff) => diff.into(),
            CollectionError::Store(store) => RepoError::Store(store),
            other => RepoError::Collection(other),
        }
    }
}

impl From<DiffError> for RepoError {
    fn from(err: DiffError) -> Self {
        RepoError::Structural(err.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::Tid;

    #[test]
    fn collection_errors_map_onto_taxonomy() {
        let tid = Tid::new(1, 0);
        assert!(matches!(
            RepoError::from(CollectionError::Monotonicity { tid, bound: tid }),
            RepoError::Monotonicity(_)
        ));
        assert!(matches!(
            RepoError::from(CollectionError::NotFound(tid)),
            RepoError::NotFound(_)
        ));
        assert!(matches!(
            RepoError::from(CollectionError::Duplicate(tid)),
            RepoError::Collection(_)
        ));
        let diff = DiffError::UnreportedCid {
            key: "k".into(),
            cid: Cid::from_hash([0; 32]),
        };
        assert!(matches!(
            RepoError::from(CollectionError::Diff(diff)),
            RepoError::Structural(_)
        ));
    }

    #[test]
    fn only_io_is_retryable() {
        let io = StoreError::Io(std::io::Error::other("disk"));
        assert!(RepoError::Store(io).is_retryable());
        assert!(!RepoError::ReadOnly.is_retryable());
        assert!(!RepoError::Store(StoreError::NotFound(Cid::from_hash([0; 32]))).is_retryable());
    }
}
