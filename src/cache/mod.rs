// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Cache
//!
//! Time-bounded cache of per-address decryption material obtained through an
//! EIP-712 signing ceremony, so a user is not asked to sign again on every
//! encrypted value view.
//!
//! ## Stores
//!
//! - **Key map**: address -> [`CredentialEntry`], expires after the TTL.
//! - **Metadata map**: address -> [`AddressMetadata`], no expiry.
//!
//! Both are mirrored to an injected [`KeyValueStorage`] after every mutation.
//!
//! ## Expiry
//!
//! An entry is absent once `now > timestamp + ttl`. This is enforced lazily
//! on [`get`](CredentialCache::get) and proactively by one timer per address
//! (see the `timers` module). Expiry evicts only the credential entry; metadata stays.
//!
//! ## Secure Mode
//!
//! With secure mode on, private keys are dropped before they are stored,
//! stripped from records loaded at startup, never returned, and the whole
//! cache is purged from memory and storage on shutdown.
//!
//! ## Lifetime
//!
//! Call [`shutdown`](CredentialCache::shutdown) when done. Dropping the cache
//! without it performs the same teardown.

mod timers;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::clock::{millis_to_datetime, Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, StoreRejection};
use crate::models::{
    is_valid_address, is_valid_signature, AddressData, AddressMetadata, CachedCredentials,
    CredentialEntry, Credentials, Metadata, WalletAddress, RESERVED_FIELDS,
};
use crate::storage::records::{load_map, persist_map, remove_record};
use crate::storage::{KeyValueStorage, MemoryStorage, ADDRESS_DATA_RECORD, KEYS_RECORD};

use self::timers::ExpiryTimers;

struct CacheState {
    keys: BTreeMap<WalletAddress, CredentialEntry>,
    metadata: BTreeMap<WalletAddress, AddressMetadata>,
    timers: ExpiryTimers,
}

struct Shared {
    config: CacheConfig,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_keys(&self, state: &CacheState) {
        persist_map(self.storage.as_ref(), KEYS_RECORD, &state.keys);
    }

    fn persist_metadata(&self, state: &CacheState) {
        persist_map(self.storage.as_ref(), ADDRESS_DATA_RECORD, &state.metadata);
    }
}

/// Address-keyed, time-bounded credential cache.
pub struct CredentialCache {
    shared: Arc<Shared>,
    released: bool,
}

impl CredentialCache {
    /// Create a cache over `storage`, using the system clock.
    pub fn new(config: CacheConfig, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_clock(config, storage, Arc::new(SystemClock))
    }

    /// Create a cache with no persistence across restarts.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryStorage::new()))
    }

    /// Create a cache over `storage` with an explicit time source.
    ///
    /// Loads both records. Key entries already past their expiry are
    /// dropped, and in secure mode any persisted private key is stripped.
    /// Surviving entries get an expiry timer when a tokio runtime is present.
    pub fn with_clock(
        config: CacheConfig,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        let ttl = config.ttl_millis();

        let loaded: BTreeMap<WalletAddress, CredentialEntry> =
            load_map(storage.as_ref(), KEYS_RECORD);
        let loaded_count = loaded.len();
        let mut stripped = 0usize;
        let mut keys = BTreeMap::new();
        for (address, mut entry) in loaded {
            if entry.is_expired(now, ttl) {
                continue;
            }
            if config.secure_mode && entry.private_key.is_some() {
                entry.private_key.zeroize();
                stripped += 1;
            }
            keys.insert(address, entry);
        }
        let discarded = loaded_count - keys.len();

        let metadata: BTreeMap<WalletAddress, AddressMetadata> =
            load_map(storage.as_ref(), ADDRESS_DATA_RECORD);

        let shared = Arc::new(Shared {
            config,
            storage,
            clock,
            state: Mutex::new(CacheState {
                keys,
                metadata,
                timers: ExpiryTimers::new(),
            }),
        });

        {
            let mut state = shared.lock_state();
            if discarded > 0 || stripped > 0 {
                shared.persist_keys(&state);
            }

            let addresses: Vec<WalletAddress> = state.keys.keys().cloned().collect();
            for address in addresses {
                arm_expiry(&shared, &mut state, &address, now);
            }

            info!(
                entries = state.keys.len(),
                metadata = state.metadata.len(),
                discarded_expired = discarded,
                stripped_private_keys = stripped,
                secure_mode = shared.config.secure_mode,
                "Credential cache loaded"
            );
        }

        Self {
            shared,
            released: false,
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Store credentials for `address`. Returns `false` on rejection.
    ///
    /// See [`try_store`](Self::try_store) for the rejection reasons.
    pub fn store(&self, address: &str, credentials: Credentials, metadata: Metadata) -> bool {
        self.try_store(address, credentials, metadata).is_ok()
    }

    /// Store credentials for `address`, reporting why a store was refused.
    ///
    /// Validation runs before any state is touched: address and public key
    /// must be present, the address must be `0x` + 40 hex digits and a
    /// non-empty signature must be `0x` + 130 hex digits. An address whose
    /// live entry already reached `max_retries` is refused as well.
    ///
    /// On success the entry gets a fresh timestamp, its retry count goes up
    /// by one, the expiry timer is re-armed and non-empty `metadata` is
    /// merged into the address metadata.
    pub fn try_store(
        &self,
        address: &str,
        credentials: Credentials,
        metadata: Metadata,
    ) -> Result<(), StoreRejection> {
        let result = self.store_inner(address, &credentials, metadata);
        match &result {
            Ok(()) => {}
            Err(rejection @ StoreRejection::RetryLimitExceeded { .. }) => {
                warn!(
                    address = %address,
                    reason = rejection.error_code(),
                    "Maximum retry attempts exceeded, credential store rejected"
                );
            }
            Err(rejection) => {
                warn!(
                    address = %address,
                    reason = rejection.error_code(),
                    "Invalid credential input, store rejected"
                );
            }
        }
        result
    }

    fn store_inner(
        &self,
        address: &str,
        credentials: &Credentials,
        metadata: Metadata,
    ) -> Result<(), StoreRejection> {
        if address.is_empty() || credentials.public_key.is_empty() {
            return Err(StoreRejection::MissingField);
        }
        if !is_valid_address(address) {
            return Err(StoreRejection::InvalidAddress(address.to_string()));
        }
        let signature = credentials
            .signature
            .as_deref()
            .filter(|signature| !signature.is_empty());
        if let Some(signature) = signature {
            if !is_valid_signature(signature) {
                return Err(StoreRejection::InvalidSignature);
            }
        }

        let key = WalletAddress::from(address).normalized();
        let config = &self.shared.config;
        let now = self.shared.clock.now_millis();
        let mut state = self.shared.lock_state();

        let existing = state
            .keys
            .get(&key)
            .map(|entry| (entry.retry_count, entry.is_expired(now, config.ttl_millis())));
        let previous = match existing {
            Some((_, true)) => {
                evict_key(&mut state, &key);
                0
            }
            Some((retry_count, false)) => retry_count,
            None => 0,
        };
        if previous >= config.max_retries {
            return Err(StoreRejection::RetryLimitExceeded {
                address: key.to_string(),
                attempts: previous,
                max_retries: config.max_retries,
            });
        }

        let entry = CredentialEntry {
            public_key: credentials.public_key.clone(),
            private_key: if config.secure_mode {
                None
            } else {
                credentials.private_key.clone()
            },
            signature: signature.map(str::to_string),
            timestamp: now,
            retry_count: previous + 1,
        };
        let retry_count = entry.retry_count;
        state.keys.insert(key.clone(), entry);
        arm_expiry(&self.shared, &mut state, &key, now);
        self.shared.persist_keys(&state);

        if !metadata.is_empty() {
            state
                .metadata
                .entry(key.clone())
                .or_default()
                .merge(metadata, now);
            self.shared.persist_metadata(&state);
        }

        info!(address = %key, retry_count, "Stored credentials");
        Ok(())
    }

    /// Look up live credentials for `address`.
    ///
    /// An overdue entry is evicted and reported as absent. The returned
    /// value is an owned copy; in secure mode its private key is `None`.
    pub fn get(&self, address: &str) -> Option<CachedCredentials> {
        if address.is_empty() {
            return None;
        }
        let key = WalletAddress::from(address).normalized();
        let mut state = self.shared.lock_state();
        self.lookup(&mut state, &key)
    }

    fn lookup(&self, state: &mut CacheState, key: &WalletAddress) -> Option<CachedCredentials> {
        let now = self.shared.clock.now_millis();
        let expired = state
            .keys
            .get(key)?
            .is_expired(now, self.shared.config.ttl_millis());

        if expired {
            evict_key(state, key);
            self.shared.persist_keys(state);
            debug!(address = %key, "Evicted expired credentials on read");
            return None;
        }

        state
            .keys
            .get(key)
            .map(|entry| entry.to_cached(self.shared.config.secure_mode))
    }

    /// Credentials and metadata for `address` in one view.
    ///
    /// `None` only when there are neither live credentials nor metadata.
    pub fn get_address_data(&self, address: &str) -> Option<AddressData> {
        if address.is_empty() {
            return None;
        }
        let key = WalletAddress::from(address).normalized();
        let mut state = self.shared.lock_state();

        let keys = self.lookup(&mut state, &key);
        let metadata = state.metadata.get(&key).cloned();
        if keys.is_none() && metadata.is_none() {
            return None;
        }

        let (mut fields, last_updated) = match metadata {
            Some(meta) => (meta.fields, Some(meta.last_updated)),
            None => (Metadata::new(), None),
        };
        // Records written elsewhere may carry the computed names.
        fields.retain(|name, _| !RESERVED_FIELDS.contains(&name.as_str()));
        Some(AddressData {
            fields,
            last_updated,
            has_keys: keys.is_some(),
            keys,
        })
    }

    /// Merge `data` into the metadata for `address`, creating it if needed.
    ///
    /// The credential entry is not touched.
    pub fn update_address_data(&self, address: &str, data: Metadata) -> Result<(), CacheError> {
        if address.is_empty() {
            return Err(CacheError::MissingAddress);
        }
        let key = WalletAddress::from(address).normalized();
        let now = self.shared.clock.now_millis();
        let mut state = self.shared.lock_state();

        state
            .metadata
            .entry(key.clone())
            .or_default()
            .merge(data, now);
        self.shared.persist_metadata(&state);

        debug!(address = %key, "Updated address metadata");
        Ok(())
    }

    /// Delete credentials and metadata for `address`. No-op when absent.
    pub fn remove(&self, address: &str) {
        if address.is_empty() {
            return;
        }
        let key = WalletAddress::from(address).normalized();
        let mut state = self.shared.lock_state();

        state.timers.disarm(&key);
        if state.keys.remove(&key).is_some() {
            self.shared.persist_keys(&state);
        }
        if state.metadata.remove(&key).is_some() {
            self.shared.persist_metadata(&state);
        }
        debug!(address = %key, "Removed cached data");
    }

    /// Empty both stores and delete both persistent records.
    pub fn clear_all(&self) {
        let mut state = self.shared.lock_state();
        clear_state(&self.shared, &mut state);
        info!("Cleared all cached credentials");
    }

    /// Every address with credentials or metadata, each once, sorted.
    pub fn list_addresses(&self) -> Vec<WalletAddress> {
        let state = self.shared.lock_state();
        let addresses: BTreeSet<&WalletAddress> =
            state.keys.keys().chain(state.metadata.keys()).collect();
        addresses.into_iter().cloned().collect()
    }

    /// Whether any record exists for `address`, expired or not.
    pub fn has_stored_data(&self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }
        let key = WalletAddress::from(address).normalized();
        let state = self.shared.lock_state();
        state.keys.contains_key(&key) || state.metadata.contains_key(&key)
    }

    /// Expiry instant of the live entry for `address`. Does not evict.
    pub fn expires_at(&self, address: &str) -> Option<DateTime<Utc>> {
        let key = WalletAddress::from(address).normalized();
        let now = self.shared.clock.now_millis();
        let ttl = self.shared.config.ttl_millis();
        let state = self.shared.lock_state();

        let entry = state.keys.get(&key)?;
        if entry.is_expired(now, ttl) {
            return None;
        }
        millis_to_datetime(entry.expires_at(ttl))
    }

    /// Stored retry counter for `address`, expired or not.
    pub fn retry_count(&self, address: &str) -> Option<u32> {
        let key = WalletAddress::from(address).normalized();
        let state = self.shared.lock_state();
        state.keys.get(&key).map(|entry| entry.retry_count)
    }

    /// Evict every overdue entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.shared.clock.now_millis();
        let ttl = self.shared.config.ttl_millis();
        let mut state = self.shared.lock_state();

        let overdue: Vec<WalletAddress> = state
            .keys
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, ttl))
            .map(|(address, _)| address.clone())
            .collect();
        for address in &overdue {
            evict_key(&mut state, address);
        }
        if !overdue.is_empty() {
            self.shared.persist_keys(&state);
            info!(count = overdue.len(), "Purged expired credentials");
        }
        overdue.len()
    }

    /// Release the cache: cancel all timers and, in secure mode, purge every
    /// record from memory and storage.
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut state = self.shared.lock_state();
        state.timers.shutdown();
        if self.shared.config.secure_mode {
            clear_state(&self.shared, &mut state);
            info!("Credential cache shut down, secure purge complete");
        } else {
            debug!("Credential cache shut down");
        }
    }
}

impl Drop for CredentialCache {
    fn drop(&mut self) {
        self.release();
    }
}

/// Remove a key entry and its timer. Metadata is left alone.
fn evict_key(state: &mut CacheState, key: &WalletAddress) {
    state.timers.disarm(key);
    state.keys.remove(key);
}

/// Purge memory first so a failing storage medium cannot leave secrets
/// resident, then remove both records.
fn clear_state(shared: &Shared, state: &mut CacheState) {
    state.timers.disarm_all();
    state.keys.clear();
    state.metadata.clear();
    remove_record(shared.storage.as_ref(), KEYS_RECORD);
    remove_record(shared.storage.as_ref(), ADDRESS_DATA_RECORD);
}

fn arm_expiry(shared: &Arc<Shared>, state: &mut CacheState, key: &WalletAddress, now: i64) {
    let expires_at = match state.keys.get(key) {
        Some(entry) => entry.expires_at(shared.config.ttl_millis()),
        None => return,
    };
    // First instant at which `is_expired` holds.
    let due_at = expires_at.saturating_add(1);
    let delay = Duration::from_millis(u64::try_from(due_at.saturating_sub(now)).unwrap_or(0));
    let weak = Arc::downgrade(shared);
    state
        .timers
        .arm(key, delay, move |address, generation| {
            expire_from_timer(&weak, &address, generation)
        });
}

fn expire_from_timer(shared: &Weak<Shared>, address: &WalletAddress, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = shared.lock_state();
    if !state.timers.is_current(address, generation) {
        return;
    }

    // The timer runs on monotonic time; expiry is decided by the cache clock.
    let now = shared.clock.now_millis();
    let due = match state.keys.get(address) {
        Some(entry) => entry.is_expired(now, shared.config.ttl_millis()),
        None => true,
    };
    if !due {
        debug!(address = %address, "Expiry timer fired early, re-arming");
        arm_expiry(&shared, &mut state, address, now);
        return;
    }

    state.timers.forget(address);
    if state.keys.remove(address).is_some() {
        shared.persist_keys(&state);
        info!(address = %address, "Credentials expired");
    }
}
