//! In-memory `MetaTxn` for unit tests, with per-index fault injection, and
//! a fault-injecting wrapper over any other `MetaTxn`.

use crate::free_list::FreeList;
use crate::txn::{FreeListOp, MetaTxn, TxnMark};
use crate::types::{DeletedDentry, DeletedInode, ExtendAttributes, Inode};
use fsmeta_common::{Error, InodeId, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Index {
    Inodes,
    DeletedInodes,
    DeletedDentries,
    Extends,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fault {
    /// Reads and writes fail
    All,
    /// Only writes fail
    Write,
}

fn injected(index: Index, inode: InodeId) -> Error {
    Error::storage(format!("injected fault on {index:?} {inode}"))
}

/// Prior value of a key written since the last mark
enum MemUndo {
    Inode(InodeId, Option<Inode>),
    Deleted(InodeId, Option<DeletedInode>),
    Extend(InodeId, Option<ExtendAttributes>),
}

#[derive(Default)]
pub struct MemTxn {
    inodes: BTreeMap<InodeId, Inode>,
    deleted: BTreeMap<InodeId, DeletedInode>,
    dentries: BTreeMap<(InodeId, String), DeletedDentry>,
    extends: BTreeMap<InodeId, ExtendAttributes>,
    free: Vec<FreeListOp>,
    undo: Vec<MemUndo>,
    faults: HashMap<(Index, InodeId), Fault>,
}

impl MemTxn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every access to `index` keyed by `inode` with a storage error.
    pub fn fail_on(&mut self, index: Index, inode: InodeId) {
        self.faults.insert((index, inode), Fault::All);
    }

    /// Fail writes to `index` keyed by `inode`; reads still succeed.
    pub fn fail_write_on(&mut self, index: Index, inode: InodeId) {
        self.faults.insert((index, inode), Fault::Write);
    }

    fn check(&self, index: Index, inode: InodeId) -> Result<()> {
        match self.faults.get(&(index, inode)) {
            Some(Fault::All) => Err(injected(index, inode)),
            _ => Ok(()),
        }
    }

    fn check_write(&self, index: Index, inode: InodeId) -> Result<()> {
        if self.faults.contains_key(&(index, inode)) {
            return Err(injected(index, inode));
        }
        Ok(())
    }

    // ---- Seeding ----

    pub fn insert_inode(&mut self, inode: Inode) {
        self.inodes.insert(inode.id, inode);
    }

    pub fn insert_deleted(&mut self, dino: DeletedInode) {
        self.deleted.insert(dino.id(), dino);
    }

    pub fn insert_dentry(&mut self, dentry: DeletedDentry) {
        self.dentries
            .insert((dentry.parent_id, dentry.name.clone()), dentry);
    }

    pub fn insert_extend(&mut self, inode: InodeId) {
        self.extends.insert(
            inode,
            ExtendAttributes::new(inode).with_attr("user.tag", b"x".to_vec()),
        );
    }

    // ---- Inspection ----

    pub fn inode(&self, inode: InodeId) -> Option<Inode> {
        self.inodes.get(&inode).cloned()
    }

    pub fn deleted(&self, inode: InodeId) -> Option<DeletedInode> {
        self.deleted.get(&inode).cloned()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn has_extend(&self, inode: InodeId) -> bool {
        self.extends.contains_key(&inode)
    }

    pub fn pending_free(&self) -> &[FreeListOp] {
        &self.free
    }

    pub fn free_pushed(&self, inode: InodeId) -> bool {
        self.free.contains(&FreeListOp::Push(inode))
    }

    pub fn free_removed(&self, inode: InodeId) -> bool {
        self.free.contains(&FreeListOp::Remove(inode))
    }
}

impl MetaTxn for MemTxn {
    fn get_inode(&self, inode: InodeId) -> Result<Option<Inode>> {
        self.check(Index::Inodes, inode)?;
        Ok(self.inodes.get(&inode).cloned())
    }

    fn create_inode(&mut self, inode: &Inode) -> Result<bool> {
        self.check_write(Index::Inodes, inode.id)?;
        if self.inodes.contains_key(&inode.id) {
            return Ok(false);
        }
        self.inodes.insert(inode.id, inode.clone());
        self.undo.push(MemUndo::Inode(inode.id, None));
        Ok(true)
    }

    fn update_inode(&mut self, inode: &Inode) -> Result<()> {
        self.check_write(Index::Inodes, inode.id)?;
        let prior = self.inodes.insert(inode.id, inode.clone());
        self.undo.push(MemUndo::Inode(inode.id, prior));
        Ok(())
    }

    fn delete_inode(&mut self, inode: InodeId) -> Result<bool> {
        self.check_write(Index::Inodes, inode)?;
        let prior = self.inodes.remove(&inode);
        let removed = prior.is_some();
        if removed {
            self.undo.push(MemUndo::Inode(inode, prior));
        }
        Ok(removed)
    }

    fn get_deleted_inode(&self, inode: InodeId) -> Result<Option<DeletedInode>> {
        self.check(Index::DeletedInodes, inode)?;
        Ok(self.deleted.get(&inode).cloned())
    }

    fn create_deleted_inode(&mut self, dino: &DeletedInode) -> Result<bool> {
        self.check_write(Index::DeletedInodes, dino.id())?;
        if self.deleted.contains_key(&dino.id()) {
            return Ok(false);
        }
        self.deleted.insert(dino.id(), dino.clone());
        self.undo.push(MemUndo::Deleted(dino.id(), None));
        Ok(true)
    }

    fn update_deleted_inode(&mut self, dino: &DeletedInode) -> Result<()> {
        self.check_write(Index::DeletedInodes, dino.id())?;
        let prior = self.deleted.insert(dino.id(), dino.clone());
        self.undo.push(MemUndo::Deleted(dino.id(), prior));
        Ok(())
    }

    fn delete_deleted_inode(&mut self, inode: InodeId) -> Result<bool> {
        self.check_write(Index::DeletedInodes, inode)?;
        let prior = self.deleted.remove(&inode);
        let removed = prior.is_some();
        if removed {
            self.undo.push(MemUndo::Deleted(inode, prior));
        }
        Ok(removed)
    }

    fn range_deleted_dentries(
        &self,
        parent: InodeId,
        f: &mut dyn FnMut(&DeletedDentry) -> bool,
    ) -> Result<()> {
        self.check(Index::DeletedDentries, parent)?;
        for ((p, _), dentry) in self.dentries.range((parent, String::new())..) {
            if *p != parent || !f(dentry) {
                break;
            }
        }
        Ok(())
    }

    fn delete_extend(&mut self, inode: InodeId) -> Result<bool> {
        self.check_write(Index::Extends, inode)?;
        let prior = self.extends.remove(&inode);
        let removed = prior.is_some();
        if removed {
            self.undo.push(MemUndo::Extend(inode, prior));
        }
        Ok(removed)
    }

    fn push_free(&mut self, inode: InodeId) {
        self.free.push(FreeListOp::Push(inode));
    }

    fn remove_free(&mut self, inode: InodeId) {
        self.free.push(FreeListOp::Remove(inode));
    }

    fn mark(&self) -> TxnMark {
        TxnMark::new(self.undo.len(), self.free.len())
    }

    fn rollback_to(&mut self, mark: TxnMark) -> Result<()> {
        let (undo, free) = mark.position();
        while self.undo.len() > undo {
            match self.undo.pop() {
                Some(MemUndo::Inode(id, prior)) => restore(&mut self.inodes, id, prior),
                Some(MemUndo::Deleted(id, prior)) => restore(&mut self.deleted, id, prior),
                Some(MemUndo::Extend(id, prior)) => restore(&mut self.extends, id, prior),
                None => break,
            }
        }
        self.free.truncate(free);
        Ok(())
    }

    fn commit(self, free_list: &FreeList) -> Result<()> {
        for op in self.free {
            op.apply(free_list);
        }
        Ok(())
    }

    fn abort(self) -> Result<()> {
        Ok(())
    }
}

fn restore<V>(map: &mut BTreeMap<InodeId, V>, id: InodeId, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(id, value);
        }
        None => {
            map.remove(&id);
        }
    }
}

/// Wraps another `MetaTxn` and fails chosen writes with a storage error.
pub struct FaultyTxn<T> {
    inner: T,
    faults: HashSet<(Index, InodeId)>,
}

impl<T: MetaTxn> FaultyTxn<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            faults: HashSet::new(),
        }
    }

    pub fn fail_write_on(mut self, index: Index, inode: InodeId) -> Self {
        self.faults.insert((index, inode));
        self
    }

    fn check_write(&self, index: Index, inode: InodeId) -> Result<()> {
        if self.faults.contains(&(index, inode)) {
            return Err(injected(index, inode));
        }
        Ok(())
    }
}

impl<T: MetaTxn> MetaTxn for FaultyTxn<T> {
    fn get_inode(&self, inode: InodeId) -> Result<Option<Inode>> {
        self.inner.get_inode(inode)
    }

    fn create_inode(&mut self, inode: &Inode) -> Result<bool> {
        self.check_write(Index::Inodes, inode.id)?;
        self.inner.create_inode(inode)
    }

    fn update_inode(&mut self, inode: &Inode) -> Result<()> {
        self.check_write(Index::Inodes, inode.id)?;
        self.inner.update_inode(inode)
    }

    fn delete_inode(&mut self, inode: InodeId) -> Result<bool> {
        self.check_write(Index::Inodes, inode)?;
        self.inner.delete_inode(inode)
    }

    fn get_deleted_inode(&self, inode: InodeId) -> Result<Option<DeletedInode>> {
        self.inner.get_deleted_inode(inode)
    }

    fn create_deleted_inode(&mut self, dino: &DeletedInode) -> Result<bool> {
        self.check_write(Index::DeletedInodes, dino.id())?;
        self.inner.create_deleted_inode(dino)
    }

    fn update_deleted_inode(&mut self, dino: &DeletedInode) -> Result<()> {
        self.check_write(Index::DeletedInodes, dino.id())?;
        self.inner.update_deleted_inode(dino)
    }

    fn delete_deleted_inode(&mut self, inode: InodeId) -> Result<bool> {
        self.check_write(Index::DeletedInodes, inode)?;
        self.inner.delete_deleted_inode(inode)
    }

    fn range_deleted_dentries(
        &self,
        parent: InodeId,
        f: &mut dyn FnMut(&DeletedDentry) -> bool,
    ) -> Result<()> {
        self.inner.range_deleted_dentries(parent, f)
    }

    fn delete_extend(&mut self, inode: InodeId) -> Result<bool> {
        self.check_write(Index::Extends, inode)?;
        self.inner.delete_extend(inode)
    }

    fn push_free(&mut self, inode: InodeId) {
        self.inner.push_free(inode);
    }

    fn remove_free(&mut self, inode: InodeId) {
        self.inner.remove_free(inode);
    }

    fn mark(&self) -> TxnMark {
        self.inner.mark()
    }

    fn rollback_to(&mut self, mark: TxnMark) -> Result<()> {
        self.inner.rollback_to(mark)
    }

    fn commit(self, free_list: &FreeList) -> Result<()> {
        self.inner.commit(free_list)
    }

    fn abort(self) -> Result<()> {
        self.inner.abort()
    }
}
