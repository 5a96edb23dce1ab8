//! Batch coordinator.
//!
//! Applies one lifecycle step to every id of a batch inside a single
//! transaction and returns one outcome per id, in batch order. Each item is
//! atomic: an item that fails part way is rolled back to where it started
//! before the [`AbortPolicy`] of the step decides whether the batch goes on.

use crate::free_list::FreeList;
use crate::trash;
use crate::txn::MetaTxn;
use fsmeta_common::{Error, InodeId, InodeOutcome, Result, Status};
use tracing::{debug, error};

/// Which item errors abort a whole batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortPolicy {
    /// Any error aborts; nothing of the batch may stay applied
    AnyError,
    /// Only storage failures abort; other errors become per-item statuses
    StorageOnly,
}

impl AbortPolicy {
    fn tolerates(self, err: &Error) -> bool {
        match self {
            Self::AnyError => false,
            Self::StorageOnly => !err.is_storage(),
        }
    }
}

/// Lifecycle step applied to every id of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Move live inodes to the trash under `timestamp`
    Trash { timestamp: i64 },
    Recover,
    Clean,
    CleanExpired,
}

impl BatchOp {
    #[must_use]
    pub const fn policy(self) -> AbortPolicy {
        match self {
            Self::Recover => AbortPolicy::AnyError,
            Self::Trash { .. } | Self::Clean | Self::CleanExpired => AbortPolicy::StorageOnly,
        }
    }

    fn apply_one<T: MetaTxn + ?Sized>(self, txn: &mut T, inode: InodeId) -> Result<InodeOutcome> {
        match self {
            Self::Trash { timestamp } => match txn.get_inode(inode)? {
                Some(live) => trash::trash(txn, &live, timestamp),
                None => Ok(InodeOutcome::new(inode, Status::NotFound)),
            },
            Self::Recover => trash::recover(txn, inode),
            Self::Clean => trash::clean(txn, inode),
            Self::CleanExpired => trash::clean_expired(txn, inode),
        }
    }
}

/// Run `op` over `inodes` in order.
///
/// Returns the full outcome list, or the first error the policy does not
/// tolerate. A failed item never stays half applied; the items before it
/// are left in the transaction and settling it is the caller's decision.
pub fn apply<T, F>(
    txn: &mut T,
    inodes: &[InodeId],
    policy: AbortPolicy,
    mut op: F,
) -> Result<Vec<InodeOutcome>>
where
    T: MetaTxn + ?Sized,
    F: FnMut(&mut T, InodeId) -> Result<InodeOutcome>,
{
    let mut outcomes = Vec::with_capacity(inodes.len());
    for &inode in inodes {
        let mark = txn.mark();
        match op(&mut *txn, inode) {
            Ok(outcome) => {
                if !outcome.is_ok() {
                    debug!("inode {} finished with status {}", inode, outcome.status);
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                txn.rollback_to(mark)?;
                if !policy.tolerates(&e) {
                    error!("batch aborted at inode {}: {}", inode, e);
                    return Err(e);
                }
                debug!("inode {} rejected: {}", inode, e);
                outcomes.push(InodeOutcome::new(inode, e.status()));
            }
        }
    }
    Ok(outcomes)
}

/// Apply `op` to `inodes` without settling the transaction.
pub fn run<T: MetaTxn + ?Sized>(
    txn: &mut T,
    op: BatchOp,
    inodes: &[InodeId],
) -> Result<Vec<InodeOutcome>> {
    apply(txn, inodes, op.policy(), |txn, inode| op.apply_one(txn, inode))
}

/// Apply `op` to `inodes` and settle the transaction.
///
/// A completed batch commits. On error an `AnyError` batch aborts, while a
/// `StorageOnly` batch commits the items applied before the failing one.
/// Either way the error is returned.
pub fn execute<T: MetaTxn>(
    mut txn: T,
    free_list: &FreeList,
    op: BatchOp,
    inodes: &[InodeId],
) -> Result<Vec<InodeOutcome>> {
    match run(&mut txn, op, inodes) {
        Ok(outcomes) => {
            txn.commit(free_list)?;
            Ok(outcomes)
        }
        Err(e) => {
            let settled = match op.policy() {
                AbortPolicy::AnyError => txn.abort(),
                AbortPolicy::StorageOnly => txn.commit(free_list),
            };
            if let Err(settle_err) = settled {
                error!("failed to settle {:?} batch: {}", op, settle_err);
            }
            Err(e)
        }
    }
}

/// Outcomes that did not succeed, as reported back to clients
#[must_use]
pub fn failed(outcomes: &[InodeOutcome]) -> Vec<InodeOutcome> {
    outcomes.iter().filter(|o| !o.is_ok()).copied().collect()
}
