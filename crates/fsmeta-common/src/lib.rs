//! fsmeta Common - Shared types and utilities
//!
//! This crate provides the inode vocabulary, operation status codes, error
//! definitions and configuration used by the metadata partition and the
//! node binary.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use types::*;
