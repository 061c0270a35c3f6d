//! LEB128 unsigned varints.

use crate::error::{ArchiveError, ArchiveResult};

/// Append `value` as a varint.
pub fn encode(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint from the start of `data`. Returns `(value, bytes_consumed)`.
///
/// `offset` is only used for error reporting.
pub fn decode(data: &[u8], offset: usize) -> ArchiveResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return Err(ArchiveError::Truncated {
                offset,
                reason: "varint overflow".into(),
            });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ArchiveError::Truncated {
        offset,
        reason: "unterminated varint".into(),
    })
}
