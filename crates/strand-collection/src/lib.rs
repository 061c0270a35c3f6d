//! Sharded time-ordered collections for Strand repositories.
//!
//! A collection is an ordered map from [`Tid`](strand_types::Tid) to block
//! address, physically split into bounded shard tables. The shard map keys
//! each table by the oldest identifier it holds; full shards are folded
//! together four at a time into the next size class, so the number of
//! shards stays logarithmic in the number of entries.
//!
//! # Key Types
//!
//! - [`ShardTable`] / [`TableSize`] -- one bounded, size-classed shard
//! - [`TidCollection`] -- the shard map and every operation over it
//! - [`CollectionUpdate`] -- what a mutation touched and the new map address
//! - [`ShardConfig`] -- per-class capacities used by writers

pub mod collection;
pub mod config;
pub mod error;
pub mod table;

pub use collection::{CollectionUpdate, TidCollection};
pub use config::ShardConfig;
pub use error::{CollectionError, CollectionResult};
pub use table::{Entry, ShardTable, TableSize};
