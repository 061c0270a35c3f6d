//! Content-addressed block storage for Strand repositories.
//!
//! Every structure in a repository (commits, roots, namespaces, shard maps,
//! shard tables, records) is stored as an immutable block keyed by the
//! BLAKE3 address of its bytes.
//!
//! # Layers
//!
//! - [`BlockStore`] -- async raw byte backend (the pluggable seam)
//! - [`MemoryBlockStore`] -- `HashMap`-based backend for tests and embedding
//! - [`Blockstore`] -- typed layer: JSON encoding, address verification,
//!   archive streaming and ingestion
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written.
//! 2. A block is only accepted under the address its bytes hash to.
//! 3. The raw backend never interprets block contents.

pub mod blockstore;
pub mod error;
pub mod memory;
pub mod traits;

pub use blockstore::Blockstore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryBlockStore;
pub use traits::BlockStore;
