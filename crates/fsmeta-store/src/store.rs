//! Persistent partition store backed by redb.
//!
//! Writes only happen through a [`RedbTxn`] obtained from
//! [`MetaStore::begin`]. Read-only lookups open their own read transaction,
//! so request handlers can run them concurrently with the apply path.

use crate::tables;
use crate::txn::RedbTxn;
use crate::types::{DeletedInode, ExtendAttributes, Inode};
use fsmeta_common::InodeId;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::info;

/// Error type for partition store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transaction poisoned by a failed rollback")]
    Poisoned,
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for fsmeta_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Bincode(e) => Self::Corrupted(e.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Row counts of the partition indexes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub inodes: u64,
    pub deleted_inodes: u64,
    pub deleted_dentries: u64,
    pub extends: u64,
}

/// Persistent partition store backed by redb.
pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::INODES)?;
            let _t = write_txn.open_table(tables::DELETED_INODES)?;
            let _t = write_txn.open_table(tables::DELETED_DENTRIES)?;
            let _t = write_txn.open_table(tables::EXTENDS)?;
        }
        write_txn.commit()?;

        info!("Opened partition store at {:?}", path);
        Ok(Self { db })
    }

    /// Begin the write transaction for one apply step.
    ///
    /// redb admits a single writer; a second caller blocks until the first
    /// transaction commits or aborts.
    pub fn begin(&self) -> StoreResult<RedbTxn> {
        Ok(RedbTxn::new(self.db.begin_write()?))
    }

    // ---- Read-only lookups ----

    pub fn get_inode(&self, inode: InodeId) -> StoreResult<Option<Inode>> {
        self.get_record(tables::INODES, inode)
    }

    pub fn get_deleted_inode(&self, inode: InodeId) -> StoreResult<Option<DeletedInode>> {
        self.get_record(tables::DELETED_INODES, inode)
    }

    pub fn get_extend(&self, inode: InodeId) -> StoreResult<Option<ExtendAttributes>> {
        self.get_record(tables::EXTENDS, inode)
    }

    /// Visit deleted inode records in id order until `f` returns false.
    pub fn scan_deleted_inodes<F>(&self, mut f: F) -> StoreResult<()>
    where
        F: FnMut(DeletedInode) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::DELETED_INODES)?;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let dino: DeletedInode = decode(value.value())?;
            if !f(dino) {
                break;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let read_txn = self.db.begin_read()?;
        Ok(StoreStats {
            inodes: read_txn.open_table(tables::INODES)?.len()?,
            deleted_inodes: read_txn.open_table(tables::DELETED_INODES)?.len()?,
            deleted_dentries: read_txn.open_table(tables::DELETED_DENTRIES)?.len()?,
            extends: read_txn.open_table(tables::EXTENDS)?.len()?,
        })
    }

    // ---- Generic helpers ----

    fn get_record<T: DeserializeOwned>(
        &self,
        table_def: TableDefinition<u64, &[u8]>,
        key: InodeId,
    ) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        let record = match table.get(key)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(record)
    }
}
