//! fsmeta Store - Metadata partition with an inode trash lifecycle
//!
//! This crate keeps a partition's live inodes, deleted inodes, deleted
//! dentries and extended attributes in redb, and implements the soft-delete
//! lifecycle (trash, recover, clean, expire, purge) on top of them.

pub mod batch;
pub mod codec;
pub mod command;
pub mod free_list;
pub mod gc;
pub mod partition;
pub mod reconcile;
pub mod store;
pub mod sweep;
pub mod tables;
pub mod trash;
pub mod txn;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports
pub use command::{Command, OpCode};
pub use free_list::FreeList;
pub use gc::TrashGc;
pub use partition::{ApplyResponse, MetaPartition};
pub use store::{MetaStore, StoreError, StoreResult, StoreStats};
pub use trash::PurgeSource;
pub use txn::{MetaTxn, RedbTxn, TxnMark};
