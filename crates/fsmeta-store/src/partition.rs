//! Metadata partition: one store, one free list, one serialized apply path.

use crate::batch::{self, BatchOp};
use crate::command::Command;
use crate::free_list::FreeList;
use crate::reconcile;
use crate::store::{MetaStore, StoreStats};
use crate::sweep;
use crate::trash;
use crate::txn::{MetaTxn, RedbTxn};
use crate::types::{DeletedInode, ExtendAttributes, Inode};
use fsmeta_common::{Config, InodeId, InodeOutcome, Result, Status};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Result of applying one command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyResponse {
    Done,
    /// One outcome per inode, in command order
    Outcomes(Vec<InodeOutcome>),
    /// Number of inodes removed by a reclamation sweep
    Purged(usize),
}

/// One metadata partition.
///
/// Commands are applied one at a time behind the apply lock, each inside its
/// own write transaction. Lookups run against read snapshots and do not take
/// the lock.
pub struct MetaPartition {
    id: u64,
    store: MetaStore,
    free_list: FreeList,
    apply_lock: Mutex<()>,
}

impl MetaPartition {
    /// Open the partition configured in `config`
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_at(config.partition.id, config.partition_db_path())
    }

    /// Open a partition stored at `path` and rebuild its free list
    pub fn open_at(id: u64, path: impl AsRef<Path>) -> Result<Self> {
        let store = MetaStore::open(path)?;
        let free_list = FreeList::new();
        reconcile::rebuild_free_list(&store, &free_list)?;
        info!("partition {} loaded, {} inodes awaiting reclamation", id, free_list.len());
        Ok(Self {
            id,
            store,
            free_list,
            apply_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn free_list(&self) -> &FreeList {
        &self.free_list
    }

    /// Apply a log entry in its raw form
    pub fn apply_raw(&self, op: u32, payload: &[u8]) -> Result<ApplyResponse> {
        let cmd = Command::decode_raw(op, payload)?;
        self.apply(&cmd)
    }

    /// Apply one decoded command
    pub fn apply(&self, cmd: &Command) -> Result<ApplyResponse> {
        let _guard = self.apply_lock.lock();
        debug!("partition {} applying {:?}", self.id, cmd.op_code());

        match cmd {
            Command::CreateInode(inode) => self.in_txn(|txn| {
                let status = if txn.create_inode(inode)? {
                    Status::Ok
                } else {
                    Status::AlreadyExists
                };
                Ok(ApplyResponse::Outcomes(vec![InodeOutcome::new(inode.id, status)]))
            }),
            Command::CreateDeletedDentry(dentry) => self.in_txn(|txn| {
                txn.put_deleted_dentry(dentry)?;
                Ok(ApplyResponse::Done)
            }),
            Command::CleanDeletedDentry { parent_id, name } => self.in_txn(|txn| {
                if !txn.delete_deleted_dentry(*parent_id, name)? {
                    debug!(
                        "partition {} deleted dentry {}/{} already gone",
                        self.id, parent_id, name
                    );
                }
                Ok(ApplyResponse::Done)
            }),
            Command::SetExtend(extend) => self.in_txn(|txn| {
                txn.put_extend(extend)?;
                Ok(ApplyResponse::Done)
            }),
            Command::TrashInodes { timestamp, inodes } => self.apply_batch(
                BatchOp::Trash {
                    timestamp: *timestamp,
                },
                inodes,
            ),
            Command::RecoverInodes(inodes) => self.apply_batch(BatchOp::Recover, inodes),
            Command::CleanInodes(inodes) => self.apply_batch(BatchOp::Clean, inodes),
            Command::CleanExpiredInodes(inodes) => {
                self.apply_batch(BatchOp::CleanExpired, inodes)
            }
            Command::InternalClean(packed) => {
                let purged = sweep::run(packed, |inode| {
                    self.in_txn(|txn| trash::purge(txn, inode))
                })?;
                Ok(ApplyResponse::Purged(purged))
            }
        }
    }

    /// Run `f` in a fresh transaction, committing on success and aborting on
    /// error.
    fn in_txn<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut RedbTxn) -> Result<R>,
    {
        let mut txn = self.store.begin()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit(&self.free_list)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    error!("partition {} abort failed: {}", self.id, abort_err);
                }
                Err(e)
            }
        }
    }

    /// Run a lifecycle batch in a fresh transaction
    fn apply_batch(&self, op: BatchOp, inodes: &[InodeId]) -> Result<ApplyResponse> {
        let txn = self.store.begin()?;
        let outcomes = batch::execute(txn, &self.free_list, op, inodes).inspect_err(|e| {
            warn!("partition {} {:?} batch failed: {}", self.id, op, e);
        })?;
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            debug!(
                "partition {} batch of {} finished with {} failures",
                self.id,
                outcomes.len(),
                failed
            );
        }
        Ok(ApplyResponse::Outcomes(outcomes))
    }

    // ---- Read-only lookups ----

    pub fn get_inode(&self, inode: InodeId) -> Result<Option<Inode>> {
        Ok(self.store.get_inode(inode)?)
    }

    pub fn get_deleted_inode(&self, inode: InodeId) -> Result<Option<DeletedInode>> {
        Ok(self.store.get_deleted_inode(inode)?)
    }

    pub fn get_extend(&self, inode: InodeId) -> Result<Option<ExtendAttributes>> {
        Ok(self.store.get_extend(inode)?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    /// Trashed records deleted at or before `cutoff` that the expiry path
    /// can act on, lowest id first.
    pub fn expired_candidates(&self, cutoff: i64, limit: usize) -> Result<Vec<InodeId>> {
        let mut candidates = Vec::new();
        if limit == 0 {
            return Ok(candidates);
        }
        self.store.scan_deleted_inodes(|dino| {
            if !dino.is_expired
                && dino.timestamp <= cutoff
                && (dino.is_empty_dir() || dino.is_temp_file())
            {
                candidates.push(dino.id());
            }
            candidates.len() < limit
        })?;
        Ok(candidates)
    }
}
