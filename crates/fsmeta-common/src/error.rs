//! Error types for fsmeta
//!
//! Every failure carries an [`ErrorKind`]. Batch coordinators decide whether
//! to abort by branching on the kind: only [`ErrorKind::Storage`] is treated
//! as fatal by the tolerant batches.

use crate::types::{InodeId, Status};
use thiserror::Error;

/// Common result type for fsmeta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for fsmeta
///
/// Lifecycle rejections that leave the indexes untouched (not found, already
/// exists, conflict) are reported as a [`Status`] on the item outcome, not as
/// an error.
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    // Lifecycle errors
    #[error("invalid state for inode {inode}: {reason}")]
    InvalidState { inode: InodeId, reason: String },

    // Command errors
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error("unknown op code: {0}")]
    UnknownOp(u32),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Error category
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transactional index layer failed
    Storage,
    /// A stored record could not be decoded or encoded
    Corrupted,
    InvalidState,
    /// A command payload could not be decoded
    Malformed,
    Configuration,
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a malformed batch error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(inode: InodeId, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            inode,
            reason: reason.into(),
        }
    }

    /// Get the category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::Storage,
            Self::Corrupted(_) => ErrorKind::Corrupted,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::MalformedBatch(_) | Self::UnknownOp(_) => ErrorKind::Malformed,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Check if the storage layer failed
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self.kind(), ErrorKind::Storage)
    }

    /// Status reported for an item that failed with this error
    #[must_use]
    pub const fn status(&self) -> Status {
        Status::OpErr
    }
}
