//! Trash transition engine.
//!
//! Each function applies one lifecycle step for one inode inside the caller's
//! transaction. Rejections that leave the indexes untouched (not found,
//! already exists, conflict) come back as an [`InodeOutcome`] status. `Err` is
//! reserved for storage failures, undecodable records and states the
//! lifecycle does not define.

use crate::txn::MetaTxn;
use crate::types::{DeletedInode, Inode};
use fsmeta_common::{Error, InodeId, InodeOutcome, Result, Status};
use tracing::{debug, warn};

/// Index an inode was purged from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeSource {
    Deleted,
    /// Never trashed, or recovered before the sweep reached it
    Live,
    Absent,
}

/// Move a live inode into the deleted index.
///
/// Only an inode down to its last link qualifies: a non-directory with at
/// most one link, or a directory with nothing left under it. The snapshot
/// carries the delete mark and, for non-directories, drops the last link.
/// When a deleted record already exists the insert reports `AlreadyExists`
/// and the live record is removed anyway, so replaying the command converges
/// on the same state.
pub fn trash<T: MetaTxn + ?Sized>(
    txn: &mut T,
    inode: &Inode,
    timestamp: i64,
) -> Result<InodeOutcome> {
    let linked = if inode.is_dir() {
        !inode.is_empty_dir()
    } else {
        inode.nlink > 1
    };
    if linked {
        return Err(Error::invalid_state(
            inode.id,
            format!("{} still has {} links", inode.inode_type, inode.nlink),
        ));
    }

    let mut snapshot = inode.clone();
    snapshot.set_delete_mark();
    if !snapshot.is_dir() {
        snapshot.dec_nlink();
    }

    let status = if txn.create_deleted_inode(&DeletedInode::new(snapshot, timestamp))? {
        Status::Ok
    } else {
        debug!("inode {} already in deleted index", inode.id);
        Status::AlreadyExists
    };

    txn.delete_inode(inode.id)?;
    Ok(InodeOutcome::new(inode.id, status))
}

/// Restore a trashed inode to the live index.
pub fn recover<T: MetaTxn + ?Sized>(txn: &mut T, inode: InodeId) -> Result<InodeOutcome> {
    let live = txn.get_inode(inode)?;
    let deleted = txn.get_deleted_inode(inode)?;

    match (live, deleted) {
        // Duplicate left behind by a replay: the live record wins
        (Some(_), Some(_)) => {
            warn!("inode {} present in both indexes, dropping deleted record", inode);
            txn.delete_deleted_inode(inode)?;
            Ok(InodeOutcome::ok(inode))
        }
        // Delete mark set but never moved to the trash
        (Some(mut live), None) => {
            live.cancel_delete_mark();
            if !live.is_dir() {
                live.inc_nlink();
            }
            txn.update_inode(&live)?;
            Ok(InodeOutcome::ok(inode))
        }
        (None, Some(dino)) => {
            if dino.is_expired {
                debug!("inode {} expired, not recoverable", inode);
                return Ok(InodeOutcome::new(inode, Status::NotFound));
            }

            let mut restored = dino.build_inode();
            restored.cancel_delete_mark();
            if restored.is_empty_dir() {
                restored.nlink = 2;
            } else {
                restored.inc_nlink();
            }

            if !txn.create_inode(&restored)? {
                warn!("inode {} reappeared in live index during recovery", inode);
                return Ok(InodeOutcome::new(inode, Status::OpErr));
            }
            txn.delete_deleted_inode(inode)?;
            Ok(InodeOutcome::ok(inode))
        }
        (None, None) => Ok(InodeOutcome::new(inode, Status::NotFound)),
    }
}

/// Explicit purge request against a trashed inode.
///
/// Empty directories leave the deleted index at once. Temp files are marked
/// expired and queued for the reclamation sweep. A directory with deleted
/// children still indexed under it is a conflict.
pub fn clean<T: MetaTxn + ?Sized>(txn: &mut T, inode: InodeId) -> Result<InodeOutcome> {
    let Some(mut dino) = txn.get_deleted_inode(inode)? else {
        return Ok(InodeOutcome::new(inode, Status::NotFound));
    };

    let mut has_children = false;
    txn.range_deleted_dentries(inode, &mut |_| {
        has_children = true;
        false
    })?;
    if has_children {
        debug!("inode {} still has deleted dentries", inode);
        return Ok(InodeOutcome::new(inode, Status::Conflict));
    }

    if dino.is_empty_dir() {
        txn.delete_deleted_inode(inode)?;
        return Ok(InodeOutcome::ok(inode));
    }

    if dino.is_temp_file() {
        dino.set_expired();
        txn.update_deleted_inode(&dino)?;
        txn.push_free(inode);
        return Ok(InodeOutcome::ok(inode));
    }

    Err(Error::invalid_state(
        inode,
        format!(
            "{} with {} links cannot be cleaned",
            dino.inode.inode_type, dino.inode.nlink
        ),
    ))
}

/// Time-driven expiry of a trashed inode.
///
/// Relies on the emptiness recorded in the snapshot rather than scanning the
/// dentry index.
pub fn clean_expired<T: MetaTxn + ?Sized>(txn: &mut T, inode: InodeId) -> Result<InodeOutcome> {
    let Some(mut dino) = txn.get_deleted_inode(inode)? else {
        return Ok(InodeOutcome::ok(inode));
    };

    if dino.is_empty_dir() {
        txn.delete_deleted_inode(inode)?;
        return Ok(InodeOutcome::ok(inode));
    }

    if dino.is_temp_file() {
        dino.set_expired();
        txn.update_deleted_inode(&dino)?;
        txn.push_free(inode);
        return Ok(InodeOutcome::ok(inode));
    }

    Err(Error::invalid_state(
        inode,
        format!(
            "{} with {} links cannot expire",
            dino.inode.inode_type, dino.inode.nlink
        ),
    ))
}

/// Irreversibly remove an inode from whichever index holds it.
///
/// The free-list entry and the extended attributes go in every case.
pub fn purge<T: MetaTxn + ?Sized>(txn: &mut T, inode: InodeId) -> Result<PurgeSource> {
    let source = if txn.delete_deleted_inode(inode)? {
        PurgeSource::Deleted
    } else if txn.delete_inode(inode)? {
        warn!("inode {} purged from live index", inode);
        PurgeSource::Live
    } else {
        PurgeSource::Absent
    };

    txn.remove_free(inode);
    txn.delete_extend(inode)?;
    Ok(source)
}
