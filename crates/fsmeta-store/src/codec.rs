//! Deleted-inode batch codec
//!
//! Two formats travel through the replicated log:
//!
//! Batch format (client-submitted lifecycle commands):
//! ```text
//! +-------+--------+----------+--------+----------+-----
//! | Count | Len[0] | Inode[0] | Len[1] | Inode[1] | ...
//! | 4B BE | 4B BE  | Len B    | 4B BE  | Len B    |
//! +-------+--------+----------+--------+----------+-----
//! ```
//! Each element currently holds one big-endian `u64`. Bytes past the first
//! eight of an element are ignored so elements can grow.
//!
//! Packed format (internal reclamation sweep): bare big-endian `u64` ids
//! back to back until the end of the buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use fsmeta_common::{Error, InodeId, Result};

/// Encoded size of one inode id
pub const INODE_ID_LEN: usize = 8;

const COUNT_LEN: usize = 4;
const ELEMENT_LEN_PREFIX: usize = 4;

/// Encode a single inode id
#[must_use]
pub const fn encode_inode(inode: InodeId) -> [u8; INODE_ID_LEN] {
    inode.to_be_bytes()
}

/// Decode a single inode id from an element payload
pub fn decode_inode(data: &[u8]) -> Result<InodeId> {
    let Some(head) = data.get(..INODE_ID_LEN) else {
        return Err(Error::malformed(format!(
            "inode element is {} bytes, need {INODE_ID_LEN}",
            data.len()
        )));
    };
    let mut buf = head;
    Ok(buf.get_u64())
}

/// Encode a batch of inode ids
pub fn encode_batch(inodes: &[InodeId]) -> Result<Bytes> {
    let count = u32::try_from(inodes.len())
        .map_err(|_| Error::malformed(format!("batch too large: {} inodes", inodes.len())))?;

    let mut buf =
        BytesMut::with_capacity(COUNT_LEN + inodes.len() * (ELEMENT_LEN_PREFIX + INODE_ID_LEN));
    buf.put_u32(count);
    for &inode in inodes {
        let element = encode_inode(inode);
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(element.len() as u32);
        buf.put_slice(&element);
    }
    Ok(buf.freeze())
}

/// Decode a batch of inode ids.
///
/// Fails with [`Error::MalformedBatch`] if the declared count or any element
/// length does not match the bytes available, or if bytes trail the batch.
pub fn decode_batch(raw: &[u8]) -> Result<Vec<InodeId>> {
    let mut buf = raw;
    if buf.remaining() < COUNT_LEN {
        return Err(Error::malformed("missing batch count"));
    }
    let count = buf.get_u32() as usize;

    // Every element needs at least its length prefix; cap the allocation by
    // what the buffer can actually hold.
    let mut inodes = Vec::with_capacity(count.min(buf.remaining() / ELEMENT_LEN_PREFIX));
    for index in 0..count {
        if buf.remaining() < ELEMENT_LEN_PREFIX {
            return Err(Error::malformed(format!(
                "batch declares {count} inodes, truncated at element {index}"
            )));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(Error::malformed(format!(
                "element {index} declares {len} bytes, {} available",
                buf.remaining()
            )));
        }
        inodes.push(decode_inode(&buf[..len])?);
        buf.advance(len);
    }

    if buf.has_remaining() {
        return Err(Error::malformed(format!(
            "{} trailing bytes after {count} inodes",
            buf.remaining()
        )));
    }
    Ok(inodes)
}

/// Encode inode ids back to back for the reclamation sweep
#[must_use]
pub fn encode_packed(inodes: &[InodeId]) -> Bytes {
    let mut buf = BytesMut::with_capacity(inodes.len() * INODE_ID_LEN);
    for &inode in inodes {
        buf.put_u64(inode);
    }
    buf.freeze()
}
