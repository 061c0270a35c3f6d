//! Archive container for Strand repositories.
//!
//! An archive is a self-contained byte buffer holding a list of declared
//! root addresses and a sequence of `(cid, bytes)` blocks. Archives are the
//! unit of synchronization: a full-history export, a single-commit snapshot
//! and an incremental diff all travel as one.
//!
//! # Layout
//!
//! ```text
//! "STAR" | version u32 BE | varint root_count | root_count x 32-byte cid
//! varint block_count | block_count x (varint len | cid | bytes | crc32 u32 BE)
//! 32-byte BLAKE3 checksum of everything above
//! ```

pub mod error;
pub mod reader;
pub mod varint;
pub mod writer;

pub use error::{ArchiveError, ArchiveResult};
pub use reader::Archive;
pub use writer::ArchiveWriter;

/// Archive magic bytes.
pub const MAGIC: &[u8; 4] = b"STAR";

/// Current archive format version.
pub const VERSION: u32 = 1;

/// Largest block accepted by the reader unless configured otherwise.
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;
