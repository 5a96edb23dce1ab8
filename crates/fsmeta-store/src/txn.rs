//! Typed transaction handle for the apply path.
//!
//! [`MetaTxn`] is the index contract the trash lifecycle is written against.
//! [`RedbTxn`] implements it over one redb write transaction. Free-list
//! updates are buffered until the transaction commits, and every index write
//! is undoable back to a [`TxnMark`] so a batch can drop a half-applied item
//! while keeping the ones before it.

use crate::free_list::FreeList;
use crate::store::{StoreError, StoreResult, decode};
use crate::tables;
use crate::types::{DeletedDentry, DeletedInode, ExtendAttributes, Inode};
use fsmeta_common::{InodeId, Result};
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

/// Position in a transaction that later writes can be rolled back to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxnMark {
    undo: usize,
    free: usize,
}

impl TxnMark {
    #[must_use]
    pub const fn new(undo: usize, free: usize) -> Self {
        Self { undo, free }
    }

    /// Undo log length and free-list op count at the mark
    #[must_use]
    pub const fn position(self) -> (usize, usize) {
        (self.undo, self.free)
    }
}

/// Index operations available inside one apply transaction.
///
/// `create_*` returns false when the key already exists and leaves the
/// stored record untouched. `delete_*` returns whether a row was removed.
pub trait MetaTxn {
    // ---- Live inode index ----
    fn get_inode(&self, inode: InodeId) -> Result<Option<Inode>>;
    fn create_inode(&mut self, inode: &Inode) -> Result<bool>;
    fn update_inode(&mut self, inode: &Inode) -> Result<()>;
    fn delete_inode(&mut self, inode: InodeId) -> Result<bool>;

    // ---- Deleted inode index ----
    fn get_deleted_inode(&self, inode: InodeId) -> Result<Option<DeletedInode>>;
    fn create_deleted_inode(&mut self, dino: &DeletedInode) -> Result<bool>;
    fn update_deleted_inode(&mut self, dino: &DeletedInode) -> Result<()>;
    fn delete_deleted_inode(&mut self, inode: InodeId) -> Result<bool>;

    // ---- Deleted dentry index ----

    /// Visit deleted dentries whose parent is `parent`, in name order, until
    /// `f` returns false.
    fn range_deleted_dentries(
        &self,
        parent: InodeId,
        f: &mut dyn FnMut(&DeletedDentry) -> bool,
    ) -> Result<()>;

    // ---- Extended attribute index ----
    fn delete_extend(&mut self, inode: InodeId) -> Result<bool>;

    // ---- Free list ----
    fn push_free(&mut self, inode: InodeId);
    fn remove_free(&mut self, inode: InodeId);

    // ---- Scope ----

    /// Current position, for [`MetaTxn::rollback_to`]
    fn mark(&self) -> TxnMark;

    /// Undo every write and free-list update made since `mark`.
    ///
    /// If the undo itself fails the transaction can no longer commit.
    fn rollback_to(&mut self, mark: TxnMark) -> Result<()>;

    /// Make the writes durable, then apply the buffered free-list updates.
    fn commit(self, free_list: &FreeList) -> Result<()>
    where
        Self: Sized;

    /// Discard the writes and the buffered free-list updates.
    fn abort(self) -> Result<()>
    where
        Self: Sized;
}

/// Free list update deferred to commit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FreeListOp {
    Push(InodeId),
    Remove(InodeId),
}

impl FreeListOp {
    pub fn apply(self, free_list: &FreeList) {
        match self {
            Self::Push(inode) => {
                free_list.push(inode);
            }
            Self::Remove(inode) => {
                free_list.remove(inode);
            }
        }
    }
}

/// Inode-keyed tables the undo log can restore
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyed {
    Inodes,
    DeletedInodes,
    Extends,
}

impl Keyed {
    const fn definition(self) -> TableDefinition<'static, u64, &'static [u8]> {
        match self {
            Self::Inodes => tables::INODES,
            Self::DeletedInodes => tables::DELETED_INODES,
            Self::Extends => tables::EXTENDS,
        }
    }
}

/// Value a key held before a write in this transaction
struct Undo {
    table: Keyed,
    key: InodeId,
    prior: Option<Vec<u8>>,
}

/// One redb write transaction scoped to a single apply call
pub struct RedbTxn {
    txn: WriteTransaction,
    pending_free: Vec<FreeListOp>,
    undo: Vec<Undo>,
    /// Set when a rollback failed half way
    poisoned: bool,
}

impl RedbTxn {
    pub(crate) const fn new(txn: WriteTransaction) -> Self {
        Self {
            txn,
            pending_free: Vec::new(),
            undo: Vec::new(),
            poisoned: false,
        }
    }

    /// Free-list updates that will be applied on commit
    pub fn pending_free(&self) -> &[FreeListOp] {
        &self.pending_free
    }

    pub fn put_deleted_dentry(&mut self, dentry: &DeletedDentry) -> StoreResult<()> {
        let bytes = bincode::serialize(dentry)?;
        let mut table = self.txn.open_table(tables::DELETED_DENTRIES)?;
        table.insert((dentry.parent_id, dentry.name.as_str()), bytes.as_slice())?;
        Ok(())
    }

    pub fn delete_deleted_dentry(&mut self, parent: InodeId, name: &str) -> StoreResult<bool> {
        let mut table = self.txn.open_table(tables::DELETED_DENTRIES)?;
        let removed = table.remove((parent, name))?.is_some();
        Ok(removed)
    }

    pub fn put_extend(&mut self, extend: &ExtendAttributes) -> StoreResult<()> {
        self.put_record(Keyed::Extends, extend.inode, extend)
    }

    fn settle_commit(self, free_list: &FreeList) -> StoreResult<()> {
        if self.poisoned {
            self.txn.abort()?;
            return Err(StoreError::Poisoned);
        }
        self.txn.commit()?;
        for op in self.pending_free {
            op.apply(free_list);
        }
        Ok(())
    }

    fn undo_to(&mut self, mark: TxnMark) -> StoreResult<()> {
        while self.undo.len() > mark.undo {
            let Some(entry) = self.undo.pop() else {
                break;
            };
            let mut table = self.txn.open_table(entry.table.definition())?;
            match entry.prior {
                Some(bytes) => {
                    table.insert(entry.key, bytes.as_slice())?;
                }
                None => {
                    table.remove(entry.key)?;
                }
            }
        }
        self.pending_free.truncate(mark.free);
        Ok(())
    }

    // ---- Generic helpers ----

    fn get_record<T: DeserializeOwned>(&self, keyed: Keyed, key: InodeId) -> StoreResult<Option<T>> {
        let table = self.txn.open_table(keyed.definition())?;
        let record = match table.get(key)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn create_record<T: Serialize>(
        &mut self,
        keyed: Keyed,
        key: InodeId,
        value: &T,
    ) -> StoreResult<bool> {
        let bytes = bincode::serialize(value)?;
        let mut table = self.txn.open_table(keyed.definition())?;
        if table.get(key)?.is_some() {
            return Ok(false);
        }
        table.insert(key, bytes.as_slice())?;
        self.undo.push(Undo {
            table: keyed,
            key,
            prior: None,
        });
        Ok(true)
    }

    fn put_record<T: Serialize>(&mut self, keyed: Keyed, key: InodeId, value: &T) -> StoreResult<()> {
        let bytes = bincode::serialize(value)?;
        let mut table = self.txn.open_table(keyed.definition())?;
        let prior = table
            .insert(key, bytes.as_slice())?
            .map(|old| old.value().to_vec());
        self.undo.push(Undo {
            table: keyed,
            key,
            prior,
        });
        Ok(())
    }

    fn delete_record(&mut self, keyed: Keyed, key: InodeId) -> StoreResult<bool> {
        let mut table = self.txn.open_table(keyed.definition())?;
        let prior = table.remove(key)?.map(|old| old.value().to_vec());
        let removed = prior.is_some();
        if removed {
            self.undo.push(Undo {
                table: keyed,
                key,
                prior,
            });
        }
        Ok(removed)
    }

    fn scan_children(
        &self,
        parent: InodeId,
        f: &mut dyn FnMut(&DeletedDentry) -> bool,
    ) -> StoreResult<()> {
        let table = self.txn.open_table(tables::DELETED_DENTRIES)?;
        // [(parent, ""), (parent + 1, "")) expressed as an open-ended scan
        // that stops at the first foreign parent.
        for entry in table.range((parent, "")..)? {
            let (key, value) = entry?;
            if key.value().0 != parent {
                break;
            }
            let dentry: DeletedDentry = decode(value.value())?;
            if !f(&dentry) {
                break;
            }
        }
        Ok(())
    }
}

impl MetaTxn for RedbTxn {
    fn get_inode(&self, inode: InodeId) -> Result<Option<Inode>> {
        Ok(self.get_record(Keyed::Inodes, inode)?)
    }

    fn create_inode(&mut self, inode: &Inode) -> Result<bool> {
        Ok(self.create_record(Keyed::Inodes, inode.id, inode)?)
    }

    fn update_inode(&mut self, inode: &Inode) -> Result<()> {
        Ok(self.put_record(Keyed::Inodes, inode.id, inode)?)
    }

    fn delete_inode(&mut self, inode: InodeId) -> Result<bool> {
        Ok(self.delete_record(Keyed::Inodes, inode)?)
    }

    fn get_deleted_inode(&self, inode: InodeId) -> Result<Option<DeletedInode>> {
        Ok(self.get_record(Keyed::DeletedInodes, inode)?)
    }

    fn create_deleted_inode(&mut self, dino: &DeletedInode) -> Result<bool> {
        Ok(self.create_record(Keyed::DeletedInodes, dino.id(), dino)?)
    }

    fn update_deleted_inode(&mut self, dino: &DeletedInode) -> Result<()> {
        Ok(self.put_record(Keyed::DeletedInodes, dino.id(), dino)?)
    }

    fn delete_deleted_inode(&mut self, inode: InodeId) -> Result<bool> {
        Ok(self.delete_record(Keyed::DeletedInodes, inode)?)
    }

    fn range_deleted_dentries(
        &self,
        parent: InodeId,
        f: &mut dyn FnMut(&DeletedDentry) -> bool,
    ) -> Result<()> {
        Ok(self.scan_children(parent, f)?)
    }

    fn delete_extend(&mut self, inode: InodeId) -> Result<bool> {
        Ok(self.delete_record(Keyed::Extends, inode)?)
    }

    fn push_free(&mut self, inode: InodeId) {
        self.pending_free.push(FreeListOp::Push(inode));
    }

    fn remove_free(&mut self, inode: InodeId) {
        self.pending_free.push(FreeListOp::Remove(inode));
    }

    fn mark(&self) -> TxnMark {
        TxnMark::new(self.undo.len(), self.pending_free.len())
    }

    fn rollback_to(&mut self, mark: TxnMark) -> Result<()> {
        if let Err(e) = self.undo_to(mark) {
            error!("rollback failed, transaction poisoned: {}", e);
            self.poisoned = true;
            return Err(e.into());
        }
        Ok(())
    }

    fn commit(self, free_list: &FreeList) -> Result<()> {
        Ok(self.settle_commit(free_list)?)
    }

    fn abort(self) -> Result<()> {
        self.txn.abort().map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetaStore;
    use fsmeta_common::InodeType;
    use tempfile::tempdir;

    fn dentry(parent: InodeId, name: &str, inode: InodeId) -> DeletedDentry {
        DeletedDentry {
            parent_id: parent,
            name: name.to_string(),
            inode,
            inode_type: InodeType::File,
            timestamp: 0,
        }
    }

    #[test]
    fn test_create_does_not_overwrite() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        let mut txn = store.begin().unwrap();

        let mut inode = Inode::new(1, InodeType::File, 0);
        assert!(txn.create_inode(&inode).unwrap());
        inode.size = 4096;
        assert!(!txn.create_inode(&inode).unwrap());
        assert_eq!(txn.get_inode(1).unwrap().unwrap().size, 0);

        txn.update_inode(&inode).unwrap();
        assert_eq!(txn.get_inode(1).unwrap().unwrap().size, 4096);

        assert!(txn.delete_inode(1).unwrap());
        assert!(!txn.delete_inode(1).unwrap());
    }

    #[test]
    fn test_range_is_scoped_to_parent() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_deleted_dentry(&dentry(6, "z", 60)).unwrap();
        txn.put_deleted_dentry(&dentry(7, "b", 71)).unwrap();
        txn.put_deleted_dentry(&dentry(7, "a", 70)).unwrap();
        txn.put_deleted_dentry(&dentry(8, "", 80)).unwrap();

        let mut names = Vec::new();
        txn.range_deleted_dentries(7, &mut |d| {
            names.push(d.name.clone());
            true
        })
        .unwrap();
        assert_eq!(names, vec!["a", "b"]);

        let mut visited = 0;
        txn.range_deleted_dentries(7, &mut |_| {
            visited += 1;
            false
        })
        .unwrap();
        assert_eq!(visited, 1);

        let mut none = 0;
        txn.range_deleted_dentries(5, &mut |_| {
            none += 1;
            true
        })
        .unwrap();
        assert_eq!(none, 0);

        assert!(txn.delete_deleted_dentry(7, "a").unwrap());
        assert!(!txn.delete_deleted_dentry(7, "a").unwrap());
    }

    #[test]
    fn test_range_at_max_parent() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_deleted_dentry(&dentry(u64::MAX, "x", 1)).unwrap();

        let mut count = 0;
        txn.range_deleted_dentries(u64::MAX, &mut |_| {
            count += 1;
            true
        })
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_free_list_applied_on_commit_only() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        let free_list = FreeList::new();

        let mut txn = store.begin().unwrap();
        txn.push_free(3);
        assert_eq!(txn.pending_free(), &[FreeListOp::Push(3)]);
        txn.abort().unwrap();
        assert!(free_list.is_empty());

        let mut txn = store.begin().unwrap();
        txn.push_free(3);
        txn.push_free(4);
        txn.remove_free(3);
        txn.commit(&free_list).unwrap();
        assert_eq!(free_list.peek(10), vec![4]);
    }

    #[test]
    fn test_rollback_restores_prior_values() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        let free_list = FreeList::new();

        let mut txn = store.begin().unwrap();
        let kept = Inode::new(1, InodeType::File, 0);
        txn.create_inode(&kept).unwrap();
        let extend = ExtendAttributes::new(1).with_attr("user.a", b"1".to_vec());
        txn.put_extend(&extend).unwrap();
        txn.push_free(1);

        let mark = txn.mark();
        let mut changed = kept.clone();
        changed.size = 10;
        txn.update_inode(&changed).unwrap();
        txn.create_deleted_inode(&DeletedInode::new(Inode::new(2, InodeType::File, 0), 5))
            .unwrap();
        txn.delete_extend(1).unwrap();
        txn.push_free(2);

        txn.rollback_to(mark).unwrap();
        assert_eq!(txn.get_inode(1).unwrap().unwrap(), kept);
        assert!(txn.get_deleted_inode(2).unwrap().is_none());
        assert_eq!(txn.pending_free(), &[FreeListOp::Push(1)]);

        txn.commit(&free_list).unwrap();
        assert_eq!(store.get_extend(1).unwrap().unwrap(), extend);
        assert_eq!(free_list.peek(10), vec![1]);
    }

    #[test]
    fn test_rollback_of_delete_reinserts() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_inode(&Inode::new(4, InodeType::Dir, 0)).unwrap();
        txn.commit(&FreeList::new()).unwrap();

        let mut txn = store.begin().unwrap();
        let mark = txn.mark();
        assert!(txn.delete_inode(4).unwrap());
        // Deleting a missing key leaves nothing to undo
        assert!(!txn.delete_inode(5).unwrap());
        txn.rollback_to(mark).unwrap();
        assert!(txn.get_inode(4).unwrap().unwrap().is_dir());
        assert!(txn.get_inode(5).unwrap().is_none());
    }
}
