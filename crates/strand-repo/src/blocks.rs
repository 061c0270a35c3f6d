//! Persisted block shapes of the commit chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strand_crypto::Signature;
use strand_types::{Cid, Identity};

/// A signed pointer to a root block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub root: Cid,
    /// Signature over the root address bytes.
    pub sig: Signature,
}

/// Per-commit snapshot of the repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoot {
    pub did: Identity,
    /// Previous commit; `None` only at genesis.
    pub prev: Option<Cid>,
    /// Every block this commit introduced.
    pub new_cids: Vec<Cid>,
    pub namespaces: BTreeMap<String, Cid>,
}

/// A namespace: the shard-map addresses of its two collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceBlock {
    pub posts: Cid,
    pub interactions: Cid,
}
