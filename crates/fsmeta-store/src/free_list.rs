//! Free list of expired inodes awaiting physical reclamation.
//!
//! The list lives in memory only. It is rebuilt on startup from deleted
//! inode records whose expiry flag is set.

use fsmeta_common::InodeId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    /// Insertion sequence -> inode, oldest first
    queue: BTreeMap<u64, InodeId>,
    /// Inode -> insertion sequence
    members: HashMap<InodeId, u64>,
    next_seq: u64,
}

/// Insertion-ordered set of inode ids
#[derive(Default)]
pub struct FreeList {
    inner: Mutex<Inner>,
}

impl FreeList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an inode. Returns false if it was already queued.
    pub fn push(&self, inode: InodeId) -> bool {
        let mut inner = self.inner.lock();
        if inner.members.contains_key(&inode) {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.insert(seq, inode);
        inner.members.insert(inode, seq);
        true
    }

    /// Drop an inode from the queue. Returns false if it was not queued.
    pub fn remove(&self, inode: InodeId) -> bool {
        let mut inner = self.inner.lock();
        match inner.members.remove(&inode) {
            Some(seq) => {
                inner.queue.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, inode: InodeId) -> bool {
        self.inner.lock().members.contains_key(&inode)
    }

    /// Up to `limit` inodes, oldest first, without dequeuing them
    pub fn peek(&self, limit: usize) -> Vec<InodeId> {
        self.inner.lock().queue.values().take(limit).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
