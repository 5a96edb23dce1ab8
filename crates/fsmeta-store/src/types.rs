//! Stored types for the partition indexes.
//!
//! These types are serialized to redb via bincode.

use fsmeta_common::{InodeId, InodeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inode flag bit: the inode has been unlinked and is pending removal
pub const DELETE_MARK_FLAG: u32 = 0x01;

/// Live file or directory metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub id: InodeId,
    pub inode_type: InodeType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub generation: u64,
    pub ctime: i64,
    pub mtime: i64,
    pub atime: i64,
    pub flag: u32,
}

impl Inode {
    /// Create a new inode with one link (two for directories: `.` and the parent entry)
    #[must_use]
    pub fn new(id: InodeId, inode_type: InodeType, now: i64) -> Self {
        Self {
            id,
            inode_type,
            mode: if inode_type.is_dir() { 0o755 } else { 0o644 },
            uid: 0,
            gid: 0,
            size: 0,
            nlink: if inode_type.is_dir() { 2 } else { 1 },
            generation: 1,
            ctime: now,
            mtime: now,
            atime: now,
            flag: 0,
        }
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.inode_type.is_dir()
    }

    /// A directory holding nothing but `.` and its parent entry
    #[must_use]
    pub const fn is_empty_dir(&self) -> bool {
        self.is_dir() && self.nlink <= 2
    }

    /// A non-directory with no remaining links
    #[must_use]
    pub const fn is_temp_file(&self) -> bool {
        !self.is_dir() && self.nlink == 0
    }

    #[must_use]
    pub const fn should_delete(&self) -> bool {
        self.flag & DELETE_MARK_FLAG != 0
    }

    pub const fn set_delete_mark(&mut self) {
        self.flag |= DELETE_MARK_FLAG;
    }

    pub const fn cancel_delete_mark(&mut self) {
        self.flag &= !DELETE_MARK_FLAG;
    }

    pub const fn inc_nlink(&mut self) {
        self.nlink = self.nlink.saturating_add(1);
    }

    pub const fn dec_nlink(&mut self) {
        self.nlink = self.nlink.saturating_sub(1);
    }
}

/// Trash record for an inode pending recovery or reclamation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedInode {
    /// Snapshot of the inode at deletion time
    pub inode: Inode,
    /// Deletion time (unix seconds)
    pub timestamp: i64,
    /// Set once the record is no longer recoverable
    pub is_expired: bool,
}

impl DeletedInode {
    #[must_use]
    pub const fn new(inode: Inode, timestamp: i64) -> Self {
        Self {
            inode,
            timestamp,
            is_expired: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> InodeId {
        self.inode.id
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.inode.is_dir()
    }

    /// Evaluated on the stored snapshot, not on the dentry index
    #[must_use]
    pub const fn is_empty_dir(&self) -> bool {
        self.inode.is_empty_dir()
    }

    #[must_use]
    pub const fn is_temp_file(&self) -> bool {
        self.inode.is_temp_file()
    }

    pub const fn set_expired(&mut self) {
        self.is_expired = true;
    }

    /// Rebuild the live inode from the snapshot
    #[must_use]
    pub fn build_inode(&self) -> Inode {
        self.inode.clone()
    }
}

/// Directory entry kept for a deleted directory's former children
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedDentry {
    pub parent_id: InodeId,
    pub name: String,
    pub inode: InodeId,
    pub inode_type: InodeType,
    /// Deletion time (unix seconds)
    pub timestamp: i64,
}

/// Extended attribute set of one inode
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendAttributes {
    pub inode: InodeId,
    pub attrs: BTreeMap<String, Vec<u8>>,
}

impl ExtendAttributes {
    #[must_use]
    pub fn new(inode: InodeId) -> Self {
        Self {
            inode,
            attrs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}
