//! Foundation types for Strand repositories.
//!
//! This crate provides the identifier and addressing types used throughout
//! the workspace. Every other Strand crate depends on `strand-types`.
//!
//! # Key Types
//!
//! - [`Cid`] -- Content address of a stored block (BLAKE3 digest)
//! - [`Tid`] -- Time-ordered identifier used as the sort and shard key of collections
//! - [`TidClock`] -- Monotonic [`Tid`] source
//! - [`Identity`] -- Opaque identity of a repository owner
//! - [`CidSet`] -- Deduplicating accumulator of addresses touched by a mutation

pub mod cid;
pub mod cid_set;
pub mod error;
pub mod identity;
pub mod tid;

pub use cid::Cid;
pub use cid_set::CidSet;
pub use error::TypeError;
pub use identity::Identity;
pub use tid::{Tid, TidClock};
