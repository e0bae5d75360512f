// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage Module
//!
//! The cache mirrors its two maps into a key-value medium so credentials
//! survive a restart within their TTL window. The medium is injected as a
//! [`KeyValueStorage`] trait object.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//!   eip712UserKeys.json      # address -> credential entry
//!   eip712AddressData.json   # address -> metadata record
//! ```
//!
//! ## Failure Policy
//!
//! Storage failures are never fatal to the cache. Reads that fail or do not
//! parse are treated as an empty store, writes that fail are logged and the
//! in-memory state stays authoritative.

pub mod fs;
pub mod memory;
pub mod paths;
pub mod records;

use std::io;

pub use fs::FileStorage;
pub use memory::MemoryStorage;
pub use paths::StoragePaths;
pub use records::{ADDRESS_DATA_RECORD, KEYS_RECORD};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record key contains characters that cannot name a file
    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    /// Storage not initialized
    #[error("Storage not initialized")]
    NotInitialized,

    /// The medium refused the write (quota, read-only, injected failure)
    #[error("Write rejected: {0}")]
    WriteRejected(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A persistent string-valued key-value medium.
pub trait KeyValueStorage: Send + Sync {
    /// Read a record. `Ok(None)` when the key has never been written.
    fn read(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace a record.
    fn write(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a record. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> StorageResult<()>;
}
