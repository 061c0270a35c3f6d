//! Signed, content-addressed per-identity repositories.
//!
//! A [`Repo`] is a chain of signed commits. Each commit points at a root
//! block recording the owner's identity, the previous commit, every block
//! the commit introduced and the address of each namespace. A namespace
//! holds two sharded, time-ordered collections: `posts` and `interactions`.
//!
//! # Key Types
//!
//! - [`Repo`] -- the aggregate: single-writer mutation, export, import, verification
//! - [`Namespace`] / [`NamespaceUpdate`] -- one named sub-tree and its mutation result
//! - [`Commit`] / [`RepoRoot`] / [`NamespaceBlock`] -- persisted block shapes
//! - [`RepoConfig`] -- shard capacities and archive limits
//!
//! # Sync
//!
//! [`Repo::export_diff`] walks the chain back to a commit the peer already
//! holds and ships only the blocks introduced since. [`Repo::import_archive`]
//! adopts an archive's root; [`Repo::load_and_verify_diff`] additionally
//! checks every commit and returns the resulting change events.

pub mod blocks;
pub mod config;
pub mod error;
pub mod export;
pub mod namespace;
pub mod repo;
pub mod verify;

pub use blocks::{Commit, NamespaceBlock, RepoRoot};
pub use config::{ArchiveConfig, RepoConfig};
pub use error::{RepoError, RepoResult};
pub use namespace::{Namespace, NamespaceUpdate};
pub use repo::Repo;

pub use strand_collection::{Entry, ShardConfig};
pub use strand_diff::{Collection, Event};
pub use strand_types::{Cid, CidSet, Identity, Tid};
