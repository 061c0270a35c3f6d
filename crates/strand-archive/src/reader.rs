use bytes::Bytes;
use strand_types::Cid;
use tracing::{debug, warn};

use crate::error::{ArchiveError, ArchiveResult};
use crate::{varint, MAGIC, MAX_BLOCK_SIZE, VERSION};

/// A parsed archive: declared roots and the blocks it carries, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Archive {
    pub roots: Vec<Cid>,
    pub blocks: Vec<(Cid, Bytes)>,
}

impl Archive {
    /// Parse with the default block size limit.
    pub fn from_bytes(data: &[u8]) -> ArchiveResult<Self> {
        Self::from_bytes_with_limit(data, MAX_BLOCK_SIZE)
    }

    /// Parse, rejecting any block larger than `max_block_size`.
    ///
    /// Block addresses are carried as declared; callers that ingest the
    /// blocks are expected to recompute them.
    pub fn from_bytes_with_limit(data: &[u8], max_block_size: usize) -> ArchiveResult<Self> {
        if data.len() < 8 + 32 {
            return Err(truncated(0, "archive too short"));
        }
        if &data[0..4] != MAGIC {
            warn!("rejected archive with bad magic");
            return Err(ArchiveError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            warn!(version, "rejected archive with unsupported version");
            return Err(ArchiveError::UnsupportedVersion(version));
        }

        let (body, trailer) = data.split_at(data.len() - 32);
        if blake3::hash(body).as_bytes() != trailer {
            warn!("rejected archive with bad checksum");
            return Err(ArchiveError::ChecksumMismatch);
        }

        let mut cursor = Cursor { data: body, pos: 8 };

        let root_count = cursor.varint()?;
        let mut roots = Vec::new();
        for _ in 0..root_count {
            roots.push(cursor.cid()?);
        }

        let block_count = cursor.varint()?;
        let mut blocks = Vec::new();
        for _ in 0..block_count {
            let len = cursor.varint()? as usize;
            if len > max_block_size {
                return Err(ArchiveError::BlockTooLarge {
                    size: len,
                    limit: max_block_size,
                });
            }
            let cid = cursor.cid()?;
            let bytes = cursor.take(len)?;
            let crc = cursor.take(4)?;
            let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
            if crc32fast::hash(bytes) != expected {
                return Err(ArchiveError::CrcMismatch { cid });
            }
            blocks.push((cid, Bytes::copy_from_slice(bytes)));
        }

        if cursor.pos != body.len() {
            return Err(truncated(cursor.pos, "trailing bytes after last block"));
        }

        debug!(roots = roots.len(), blocks = blocks.len(), "read archive");
        Ok(Self { roots, blocks })
    }

    /// Bytes of the block with the given address, if carried.
    pub fn get(&self, cid: &Cid) -> Option<&Bytes> {
        self.blocks.iter().find(|(c, _)| c == cid).map(|(_, b)| b)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> ArchiveResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| truncated(self.pos, "unexpected end of data"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn varint(&mut self) -> ArchiveResult<u64> {
        let (value, consumed) = varint::decode(&self.data[self.pos..], self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    fn cid(&mut self) -> ArchiveResult<Cid> {
        let bytes = self.take(32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Cid::from_hash(arr))
    }
}

fn truncated(offset: usize, reason: &str) -> ArchiveError {
    ArchiveError::Truncated {
        offset,
        reason: reason.into(),
    }
}
