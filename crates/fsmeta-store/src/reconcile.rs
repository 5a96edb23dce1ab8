//! Startup reconciliation of the in-memory free list.

use crate::free_list::FreeList;
use crate::store::{MetaStore, StoreResult};
use tracing::info;

/// Queue every expired, non-directory deleted record that the free list is
/// missing. Returns how many ids were added.
pub fn rebuild_free_list(store: &MetaStore, free_list: &FreeList) -> StoreResult<usize> {
    let mut added = 0;
    store.scan_deleted_inodes(|dino| {
        if dino.is_expired && !dino.is_dir() && free_list.push(dino.id()) {
            added += 1;
        }
        true
    })?;
    info!(
        "free list reconciled: {} added, {} queued",
        added,
        free_list.len()
    );
    Ok(added)
}
