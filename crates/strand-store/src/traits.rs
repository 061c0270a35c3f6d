use async_trait::async_trait;
use bytes::Bytes;
use strand_types::Cid;

use crate::error::StoreResult;

/// Raw content-addressed block backend.
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written; writing an existing address is a no-op.
/// - Concurrent reads are always safe.
/// - The backend never interprets or verifies block contents. Address
///   verification happens in [`Blockstore`](crate::Blockstore).
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Read a block by address.
    ///
    /// Returns `Ok(None)` if the block does not exist.
    async fn get(&self, cid: &Cid) -> StoreResult<Option<Bytes>>;

    /// Write a block under the given address (idempotent).
    async fn put(&self, cid: Cid, data: Bytes) -> StoreResult<()>;

    /// Check whether a block exists.
    async fn has(&self, cid: &Cid) -> StoreResult<bool>;
}
