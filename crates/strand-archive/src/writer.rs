use std::collections::HashSet;

use bytes::Bytes;
use strand_types::Cid;
use tracing::debug;

use crate::{varint, MAGIC, VERSION};

/// Builds an archive from declared roots and a stream of blocks.
///
/// Blocks are kept in insertion order. Writing a block whose address is
/// already present is a no-op, so overlapping closures may be streamed in
/// without producing duplicates.
#[derive(Debug)]
pub struct ArchiveWriter {
    roots: Vec<Cid>,
    blocks: Vec<(Cid, Bytes)>,
    seen: HashSet<Cid>,
}

impl ArchiveWriter {
    pub fn new(roots: Vec<Cid>) -> Self {
        Self {
            roots,
            blocks: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Queue a block. Returns `false` if the address was already written.
    pub fn write_block(&mut self, cid: Cid, data: Bytes) -> bool {
        if !self.seen.insert(cid) {
            return false;
        }
        self.blocks.push((cid, data));
        true
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.seen.contains(cid)
    }

    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Number of distinct blocks queued.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialize the archive.
    pub fn finish(self) -> Vec<u8> {
        let payload: usize = self.blocks.iter().map(|(_, b)| b.len() + 48).sum();
        let mut out = Vec::with_capacity(16 + self.roots.len() * 32 + payload + 32);

        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());

        varint::encode(&mut out, self.roots.len() as u64);
        for root in &self.roots {
            out.extend_from_slice(root.as_bytes());
        }

        varint::encode(&mut out, self.blocks.len() as u64);
        for (cid, data) in &self.blocks {
            varint::encode(&mut out, data.len() as u64);
            out.extend_from_slice(cid.as_bytes());
            out.extend_from_slice(data);
            out.extend_from_slice(&crc32fast::hash(data).to_be_bytes());
        }

        let checksum = *blake3::hash(&out).as_bytes();
        out.extend_from_slice(&checksum);

        debug!(
            roots = self.roots.len(),
            blocks = self.blocks.len(),
            size = out.len(),
            "wrote archive"
        );
        out
    }
}
