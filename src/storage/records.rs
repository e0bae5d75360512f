// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Loading and saving the two address-keyed records.
//!
//! Both records are JSON objects mapping address to record. Loading is
//! defensive: an unreadable record, a document that is not a JSON object, or
//! an individual entry that does not deserialize is logged and skipped.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{KeyValueStorage, StorageResult};
use crate::models::WalletAddress;

/// Record key for the credential map.
pub const KEYS_RECORD: &str = "eip712UserKeys";

/// Record key for the metadata map.
pub const ADDRESS_DATA_RECORD: &str = "eip712AddressData";

/// Load an address-keyed map, treating every failure as an empty store.
///
/// Addresses are normalised to lowercase on load.
pub fn load_map<T: DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> BTreeMap<WalletAddress, T> {
    let raw = match storage.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return BTreeMap::new(),
        Err(e) => {
            warn!(record = key, error = %e, "Error reading record from storage");
            return BTreeMap::new();
        }
    };

    let document: Map<String, Value> = match serde_json::from_str(&raw) {
        Ok(Value::Object(document)) => document,
        Ok(Value::Null) => return BTreeMap::new(),
        Ok(_) => {
            warn!(record = key, "Stored record is not a JSON object, ignoring");
            return BTreeMap::new();
        }
        Err(e) => {
            warn!(record = key, error = %e, "Error parsing JSON record");
            return BTreeMap::new();
        }
    };

    let mut map = BTreeMap::new();
    for (address, value) in document {
        match serde_json::from_value::<T>(value) {
            Ok(entry) => {
                let normalized = WalletAddress::from(address.as_str()).normalized();
                if map.insert(normalized, entry).is_some() {
                    warn!(
                        record = key,
                        address = %address,
                        "Duplicate address in another letter case, keeping the later entry"
                    );
                }
            }
            Err(e) => {
                warn!(record = key, address = %address, error = %e, "Skipping malformed entry");
            }
        }
    }
    map
}

/// Serialize and write an address-keyed map.
pub fn save_map<T: Serialize>(
    storage: &dyn KeyValueStorage,
    key: &str,
    map: &BTreeMap<WalletAddress, T>,
) -> StorageResult<()> {
    let json = serde_json::to_string(map)?;
    storage.write(key, &json)?;
    debug!(record = key, entries = map.len(), "Persisted record");
    Ok(())
}

/// Best-effort variant of [`save_map`]: failures are logged, never returned.
pub fn persist_map<T: Serialize>(
    storage: &dyn KeyValueStorage,
    key: &str,
    map: &BTreeMap<WalletAddress, T>,
) {
    if let Err(e) = save_map(storage, key, map) {
        warn!(record = key, error = %e, "Error writing record to storage");
    }
}

/// Best-effort record removal.
pub fn remove_record(storage: &dyn KeyValueStorage, key: &str) {
    if let Err(e) = storage.remove(key) {
        warn!(record = key, error = %e, "Error removing record from storage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AddressMetadata, CredentialEntry};
    use crate::storage::MemoryStorage;
    use serde_json::json;

    const ADDR: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    #[test]
    fn missing_record_loads_empty() {
        let storage = MemoryStorage::new();
        let map: BTreeMap<WalletAddress, CredentialEntry> = load_map(&storage, KEYS_RECORD);
        assert!(map.is_empty());
    }

    #[test]
    fn corrupt_json_loads_empty() {
        let storage = MemoryStorage::new();
        storage.insert_raw(KEYS_RECORD, "{not json");
        let map: BTreeMap<WalletAddress, CredentialEntry> = load_map(&storage, KEYS_RECORD);
        assert!(map.is_empty());

        storage.insert_raw(KEYS_RECORD, "[1, 2, 3]");
        let map: BTreeMap<WalletAddress, CredentialEntry> = load_map(&storage, KEYS_RECORD);
        assert!(map.is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped_individually() {
        let storage = MemoryStorage::new();
        let doc = json!({
            ADDR: {"publicKey": "pk", "privateKey": null, "timestamp": 5, "retryCount": 1},
            "0x1111111111111111111111111111111111111111": {"timestamp": "yesterday"}
        });
        storage.insert_raw(KEYS_RECORD, &doc.to_string());

        let map: BTreeMap<WalletAddress, CredentialEntry> = load_map(&storage, KEYS_RECORD);
        assert_eq!(map.len(), 1);
        let entry = map.get(&WalletAddress::from(ADDR).normalized()).unwrap();
        assert_eq!(entry.public_key, "pk");
        assert_eq!(entry.retry_count, 1);
    }

    #[test]
    fn addresses_differing_only_in_case_collapse_to_one_entry() {
        let storage = MemoryStorage::new();
        let doc = json!({
            ADDR: {"publicKey": "pk-mixed", "timestamp": 5, "retryCount": 1},
            (ADDR.to_lowercase()): {"publicKey": "pk-lower", "timestamp": 6, "retryCount": 2}
        });
        storage.insert_raw(KEYS_RECORD, &doc.to_string());

        let map: BTreeMap<WalletAddress, CredentialEntry> = load_map(&storage, KEYS_RECORD);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&WalletAddress::from(ADDR.to_lowercase())));
    }

    #[test]
    fn save_then_load_metadata() {
        let storage = MemoryStorage::new();
        let mut map = BTreeMap::new();
        let mut meta = AddressMetadata::default();
        meta.merge(json!({"nickname": "alice"}).as_object().unwrap().clone(), 9);
        map.insert(WalletAddress::from(ADDR).normalized(), meta.clone());

        save_map(&storage, ADDRESS_DATA_RECORD, &map).unwrap();
        let loaded: BTreeMap<WalletAddress, AddressMetadata> =
            load_map(&storage, ADDRESS_DATA_RECORD);
        assert_eq!(loaded, map);
    }

    #[test]
    fn persist_swallows_write_failures() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        let map: BTreeMap<WalletAddress, AddressMetadata> = BTreeMap::new();

        assert!(save_map(&storage, ADDRESS_DATA_RECORD, &map).is_err());
        persist_map(&storage, ADDRESS_DATA_RECORD, &map);
        remove_record(&storage, ADDRESS_DATA_RECORD);
        assert!(storage.get_raw(ADDRESS_DATA_RECORD).is_none());
    }
}
