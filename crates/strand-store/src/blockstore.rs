use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strand_archive::{Archive, ArchiveWriter};
use strand_crypto::ContentHasher;
use strand_types::Cid;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBlockStore;
use crate::traits::BlockStore;

/// Typed view over a [`BlockStore`].
///
/// Values are encoded as JSON and addressed with [`ContentHasher::BLOCK`].
/// Cheap to clone: clones share the same backend.
#[derive(Clone)]
pub struct Blockstore {
    inner: Arc<dyn BlockStore>,
}

impl Blockstore {
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self { inner }
    }

    /// A blockstore over a fresh [`MemoryBlockStore`].
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBlockStore::new()))
    }

    /// Encode a value into block bytes and compute its address.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> StoreResult<(Cid, Bytes)> {
        let data = serde_json::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))?;
        let cid = ContentHasher::BLOCK.hash(&data);
        Ok((cid, Bytes::from(data)))
    }

    /// Encode and store a value, returning its address.
    pub async fn put<T: Serialize + ?Sized + Sync>(&self, value: &T) -> StoreResult<Cid> {
        let (cid, data) = Self::encode(value)?;
        self.inner.put(cid, data).await?;
        Ok(cid)
    }

    /// Fetch and decode a block.
    ///
    /// Fails with [`StoreError::NotFound`] if absent and
    /// [`StoreError::Decode`] if the bytes are not a `T`.
    pub async fn get<T: DeserializeOwned>(&self, cid: &Cid) -> StoreResult<T> {
        let data = self.get_bytes(cid).await?;
        serde_json::from_slice(&data).map_err(|e| StoreError::Decode {
            cid: *cid,
            reason: e.to_string(),
        })
    }

    pub async fn get_bytes(&self, cid: &Cid) -> StoreResult<Bytes> {
        self.inner
            .get(cid)
            .await?
            .ok_or(StoreError::NotFound(*cid))
    }

    /// Store raw bytes under a claimed address, verifying the claim.
    pub async fn put_bytes(&self, cid: Cid, data: Bytes) -> StoreResult<()> {
        let computed = ContentHasher::BLOCK.hash(&data);
        if computed != cid {
            return Err(StoreError::HashMismatch {
                expected: cid,
                computed,
            });
        }
        self.inner.put(cid, data).await
    }

    pub async fn has(&self, cid: &Cid) -> StoreResult<bool> {
        self.inner.has(cid).await
    }

    /// The subset of `cids` not present, in input order.
    pub async fn missing(&self, cids: &[Cid]) -> StoreResult<Vec<Cid>> {
        let present = try_join_all(cids.iter().map(|cid| self.inner.has(cid))).await?;
        Ok(cids
            .iter()
            .zip(present)
            .filter(|(_, has)| !has)
            .map(|(cid, _)| *cid)
            .collect())
    }

    /// Stream one block into an archive.
    pub async fn add_to_archive(&self, writer: &mut ArchiveWriter, cid: &Cid) -> StoreResult<()> {
        if writer.contains(cid) {
            return Ok(());
        }
        let data = self.get_bytes(cid).await?;
        writer.write_block(*cid, data);
        Ok(())
    }

    /// Stream a group of blocks into an archive.
    ///
    /// Blocks are fetched concurrently and appended in input order. Blocks
    /// already in the writer are skipped without a fetch.
    pub async fn add_all_to_archive(
        &self,
        writer: &mut ArchiveWriter,
        cids: &[Cid],
    ) -> StoreResult<()> {
        let wanted: Vec<Cid> = cids
            .iter()
            .filter(|cid| !writer.contains(cid))
            .copied()
            .collect();
        let fetched = try_join_all(wanted.iter().map(|cid| self.get_bytes(cid))).await?;
        for (cid, data) in wanted.into_iter().zip(fetched) {
            writer.write_block(cid, data);
        }
        Ok(())
    }

    /// Ingest every block of a parsed archive, verifying each address.
    ///
    /// Returns the archive's declared roots.
    pub async fn put_archive(&self, archive: Archive) -> StoreResult<Vec<Cid>> {
        let count = archive.blocks.len();
        try_join_all(
            archive
                .blocks
                .into_iter()
                .map(|(cid, data)| self.put_bytes(cid, data)),
        )
        .await?;
        debug!(blocks = count, roots = archive.roots.len(), "ingested archive");
        Ok(archive.roots)
    }

    /// Parse an archive and ingest every block it carries.
    pub async fn read_archive(&self, bytes: &[u8], max_block_size: usize) -> StoreResult<Vec<Cid>> {
        let archive = Archive::from_bytes_with_limit(bytes, max_block_size)?;
        self.put_archive(archive).await
    }
}

impl std::fmt::Debug for Blockstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockstore").finish_non_exhaustive()
    }
}
