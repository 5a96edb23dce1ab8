//! Core types for fsmeta
//!
//! Inode identifiers, inode kinds and the status vocabulary reported for
//! every lifecycle operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inode number, unique within a partition
pub type InodeId = u64;

/// Kind of filesystem object an inode describes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InodeType {
    /// Regular file
    #[default]
    File,
    /// Directory
    Dir,
    /// Symbolic link
    Symlink,
}

impl InodeType {
    /// Check if this is a directory
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }
}

impl fmt::Display for InodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "dir"),
            Self::Symlink => write!(f, "symlink"),
        }
    }
}

/// Result status of a single-inode operation.
///
/// This is the fixed vocabulary surfaced to the request handler. The `u8`
/// representation is the wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    AlreadyExists = 1,
    NotFound = 2,
    /// The operation would violate an invariant (e.g. non-empty directory)
    Conflict = 3,
    /// Generic operation error
    OpErr = 4,
}

impl Status {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Wire code
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::AlreadyExists),
            2 => Ok(Self::NotFound),
            3 => Ok(Self::Conflict),
            4 => Ok(Self::OpErr),
            other => Err(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::AlreadyExists => "already exists",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::OpErr => "operation error",
        };
        f.write_str(s)
    }
}

/// Outcome of a lifecycle operation on one inode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeOutcome {
    pub inode: InodeId,
    pub status: Status,
}

impl InodeOutcome {
    #[must_use]
    pub const fn new(inode: InodeId, status: Status) -> Self {
        Self { inode, status }
    }

    #[must_use]
    pub const fn ok(inode: InodeId) -> Self {
        Self::new(inode, Status::Ok)
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
