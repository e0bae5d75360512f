// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EIP-712 Key Cache - Time-bounded session credential cache
//!
//! After a user completes an EIP-712 signing ceremony, the resulting
//! decryption material (public key, optional private key, authorization
//! signature) is cached per wallet address so the user is not asked to sign
//! again on every encrypted value view.
//!
//! ## Modules
//!
//! - `cache` - The credential cache manager and its expiry timers
//! - `clock` - Injectable time source
//! - `config` - Cache configuration and environment variables
//! - `error` - Error types
//! - `logging` - Tracing subscriber setup
//! - `models` - Wallet address, credential and metadata records
//! - `storage` - Persistent key-value storage (file and in-memory)
//!
//! ## Example
//!
//! ```rust,ignore
//! let storage = Arc::new(FileStorage::open_from_env()?);
//! let cache = CredentialCache::new(CacheConfig::from_env(), storage);
//!
//! let creds = Credentials::new(public_key).with_signature(signature);
//! if !cache.store(&address, creds, Metadata::new()) {
//!     // prompt the user to sign again
//! }
//! let keys = cache.get(&address);
//! cache.shutdown();
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use cache::CredentialCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CacheError, StoreRejection};
pub use models::{
    AddressData, AddressMetadata, CachedCredentials, CredentialEntry, Credentials, Metadata,
    WalletAddress,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError, StoragePaths};
