//! Redb table definitions for the partition indexes.

use redb::TableDefinition;

// Live namespace
// Key: inode id, Value: bincode-encoded Inode
pub const INODES: TableDefinition<u64, &[u8]> = TableDefinition::new("inodes");

// Trash
// Key: inode id, Value: bincode-encoded DeletedInode
pub const DELETED_INODES: TableDefinition<u64, &[u8]> = TableDefinition::new("deleted_inodes");
// Key: (parent inode id, child name), Value: bincode-encoded DeletedDentry
pub const DELETED_DENTRIES: TableDefinition<(u64, &str), &[u8]> =
    TableDefinition::new("deleted_dentries");

// Extended attributes
// Key: inode id, Value: bincode-encoded ExtendAttributes
pub const EXTENDS: TableDefinition<u64, &[u8]> = TableDefinition::new("extends");
