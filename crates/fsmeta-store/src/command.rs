//! Replicated-log commands understood by the partition apply path.
//!
//! A log entry is an [`OpCode`] plus an opaque payload. Lifecycle batches
//! use the length-prefixed inode batch format; the reclamation sweep uses
//! packed ids; record-creation commands carry bincode records.

use crate::codec;
use crate::types::{DeletedDentry, ExtendAttributes, Inode};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use fsmeta_common::{Error, InodeId, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

const TIMESTAMP_LEN: usize = 8;

/// Log entry operation code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpCode {
    CreateInode = 1,
    CreateDeletedDentry = 2,
    CleanDeletedDentry = 3,
    SetExtend = 4,
    TrashInodes = 10,
    RecoverInodes = 11,
    CleanInodes = 12,
    CleanExpiredInodes = 13,
    InternalClean = 14,
}

impl TryFrom<u32> for OpCode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            1 => Self::CreateInode,
            2 => Self::CreateDeletedDentry,
            3 => Self::CleanDeletedDentry,
            4 => Self::SetExtend,
            10 => Self::TrashInodes,
            11 => Self::RecoverInodes,
            12 => Self::CleanInodes,
            13 => Self::CleanExpiredInodes,
            14 => Self::InternalClean,
            other => return Err(Error::UnknownOp(other)),
        })
    }
}

impl From<OpCode> for u32 {
    fn from(op: OpCode) -> Self {
        op as Self
    }
}

/// Decoded log entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    CreateInode(Inode),
    CreateDeletedDentry(DeletedDentry),
    CleanDeletedDentry { parent_id: InodeId, name: String },
    SetExtend(ExtendAttributes),
    TrashInodes { timestamp: i64, inodes: Vec<InodeId> },
    RecoverInodes(Vec<InodeId>),
    CleanInodes(Vec<InodeId>),
    CleanExpiredInodes(Vec<InodeId>),
    /// Packed ids, decoded entry by entry while the sweep runs
    InternalClean(Bytes),
}

impl Command {
    #[must_use]
    pub const fn op_code(&self) -> OpCode {
        match self {
            Self::CreateInode(_) => OpCode::CreateInode,
            Self::CreateDeletedDentry(_) => OpCode::CreateDeletedDentry,
            Self::CleanDeletedDentry { .. } => OpCode::CleanDeletedDentry,
            Self::SetExtend(_) => OpCode::SetExtend,
            Self::TrashInodes { .. } => OpCode::TrashInodes,
            Self::RecoverInodes(_) => OpCode::RecoverInodes,
            Self::CleanInodes(_) => OpCode::CleanInodes,
            Self::CleanExpiredInodes(_) => OpCode::CleanExpiredInodes,
            Self::InternalClean(_) => OpCode::InternalClean,
        }
    }

    /// Build a sweep command for the given ids
    #[must_use]
    pub fn internal_clean(inodes: &[InodeId]) -> Self {
        Self::InternalClean(codec::encode_packed(inodes))
    }

    /// Encode into an op code and log payload
    pub fn encode(&self) -> Result<(OpCode, Vec<u8>)> {
        let payload = match self {
            Self::CreateInode(inode) => to_payload(inode)?,
            Self::CreateDeletedDentry(dentry) => to_payload(dentry)?,
            Self::CleanDeletedDentry { parent_id, name } => to_payload(&(parent_id, name))?,
            Self::SetExtend(extend) => to_payload(extend)?,
            Self::TrashInodes { timestamp, inodes } => {
                let batch = codec::encode_batch(inodes)?;
                let mut buf = BytesMut::with_capacity(TIMESTAMP_LEN + batch.len());
                buf.put_i64(*timestamp);
                buf.put_slice(&batch);
                buf.to_vec()
            }
            Self::RecoverInodes(inodes)
            | Self::CleanInodes(inodes)
            | Self::CleanExpiredInodes(inodes) => codec::encode_batch(inodes)?.to_vec(),
            Self::InternalClean(packed) => packed.to_vec(),
        };
        Ok((self.op_code(), payload))
    }

    /// Decode a log entry. Fails with a malformed error before any index is
    /// touched if the payload does not match the op code.
    pub fn decode(op: OpCode, payload: &[u8]) -> Result<Self> {
        Ok(match op {
            OpCode::CreateInode => Self::CreateInode(from_payload(payload)?),
            OpCode::CreateDeletedDentry => Self::CreateDeletedDentry(from_payload(payload)?),
            OpCode::CleanDeletedDentry => {
                let (parent_id, name): (InodeId, String) = from_payload(payload)?;
                Self::CleanDeletedDentry { parent_id, name }
            }
            OpCode::SetExtend => Self::SetExtend(from_payload(payload)?),
            OpCode::TrashInodes => {
                if payload.len() < TIMESTAMP_LEN {
                    return Err(Error::malformed("trash command missing timestamp"));
                }
                let mut buf = payload;
                let timestamp = buf.get_i64();
                Self::TrashInodes {
                    timestamp,
                    inodes: codec::decode_batch(buf)?,
                }
            }
            OpCode::RecoverInodes => Self::RecoverInodes(codec::decode_batch(payload)?),
            OpCode::CleanInodes => Self::CleanInodes(codec::decode_batch(payload)?),
            OpCode::CleanExpiredInodes => Self::CleanExpiredInodes(codec::decode_batch(payload)?),
            OpCode::InternalClean => Self::InternalClean(Bytes::copy_from_slice(payload)),
        })
    }

    /// Decode from a raw op code as read from the log
    pub fn decode_raw(op: u32, payload: &[u8]) -> Result<Self> {
        Self::decode(OpCode::try_from(op)?, payload)
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Corrupted(e.to_string()))
}

fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| Error::malformed(e.to_string()))
}
