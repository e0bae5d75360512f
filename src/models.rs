// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cache Data Models
//!
//! Records held by the credential cache and the values handed back to
//! callers. Persisted records use camelCase field names so that maps written
//! by the browser signing flow load unchanged.
//!
//! ## Wallet Address Type
//!
//! The [`WalletAddress`] newtype wraps Ethereum-style addresses (0x-prefixed,
//! 40 hex characters). Addresses are lowercased before they are used as map
//! keys.
//!
//! ## Secret Handling
//!
//! Types carrying a private key redact it from `Debug` output and zeroize it
//! on drop.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroize;

/// Open mapping of caller-supplied metadata fields.
pub type Metadata = Map<String, Value>;

/// Field name reserved for the metadata write instant.
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// Field names computed by the cache for [`AddressData`]. Never stored as metadata.
pub const RESERVED_FIELDS: [&str; 3] = [LAST_UPDATED_FIELD, "hasKeys", "keys"];

/// Hex digits in a 20-byte address.
const ADDRESS_HEX_LEN: usize = 40;

/// Hex digits in a 65-byte `r || s || v` signature.
const SIGNATURE_HEX_LEN: usize = 130;

// =============================================================================
// Wallet Address Type
// =============================================================================

/// Ethereum-compatible wallet address wrapper.
///
/// Format: `0x` followed by 40 hexadecimal characters (20 bytes).
///
/// # Example
///
/// ```rust,ignore
/// let addr = WalletAddress::from("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12");
/// assert!(addr.is_well_formed());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// Lowercased form used as the cache key.
    pub fn normalized(&self) -> WalletAddress {
        WalletAddress(self.0.to_lowercase())
    }

    /// `0x` (either case) followed by exactly 40 hex digits.
    pub fn is_well_formed(&self) -> bool {
        is_valid_address(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WalletAddress {
    fn from(value: String) -> Self {
        WalletAddress(value)
    }
}

impl From<&str> for WalletAddress {
    fn from(value: &str) -> Self {
        WalletAddress(value.to_string())
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

/// Check an address: `0x`/`0X` prefix and exactly 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    let digits = match address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    {
        Some(digits) => digits,
        None => return false,
    };
    digits.len() == ADDRESS_HEX_LEN && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check a signature: lowercase `0x` prefix and exactly 130 hex digits.
pub fn is_valid_signature(signature: &str) -> bool {
    match signature.strip_prefix("0x") {
        Some(digits) => {
            digits.len() == SIGNATURE_HEX_LEN && digits.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}

// =============================================================================
// Credential Models
// =============================================================================

/// Key material produced by a completed signing ceremony.
///
/// This is what the auth layer hands to
/// [`CredentialCache::store`](crate::cache::CredentialCache::store).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub public_key: String,
    pub private_key: Option<String>,
    pub signature: Option<String>,
}

impl Credentials {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: None,
            signature: None,
        }
    }

    pub fn with_private_key(mut self, private_key: impl Into<String>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("signature", &self.signature)
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// A cached credential as persisted under the key-material record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntry {
    pub public_key: String,
    /// Always `None` while secure mode is on.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Creation/refresh instant, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Successful stores for this address, starting at 1.
    pub retry_count: u32,
}

impl CredentialEntry {
    /// Instant (ms) after which the entry is logically absent.
    pub fn expires_at(&self, ttl_millis: i64) -> i64 {
        self.timestamp.saturating_add(ttl_millis)
    }

    /// `now > timestamp + ttl`. The expiry instant itself is still valid.
    pub fn is_expired(&self, now_millis: i64, ttl_millis: i64) -> bool {
        now_millis > self.expires_at(ttl_millis)
    }

    /// Owned copy for callers, with the private key withheld in secure mode.
    pub fn to_cached(&self, secure_mode: bool) -> CachedCredentials {
        CachedCredentials {
            public_key: self.public_key.clone(),
            private_key: if secure_mode {
                None
            } else {
                self.private_key.clone()
            },
            signature: self.signature.clone(),
        }
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("signature", &self.signature)
            .field("timestamp", &self.timestamp)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

impl Drop for CredentialEntry {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Credential view returned by [`CredentialCache::get`](crate::cache::CredentialCache::get).
///
/// Always an independent copy; mutating it never reaches the cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCredentials {
    pub public_key: String,
    pub private_key: Option<String>,
    pub signature: Option<String>,
}

impl fmt::Debug for CachedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCredentials")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("signature", &self.signature)
            .finish()
    }
}

impl Drop for CachedCredentials {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

// =============================================================================
// Metadata Models
// =============================================================================

/// Per-address metadata record, independent of the credential entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressMetadata {
    #[serde(flatten)]
    pub fields: Metadata,
    /// Last write instant, milliseconds since the Unix epoch.
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: i64,
}

impl AddressMetadata {
    /// Shallow-merge `data` into the record and stamp `lastUpdated`.
    ///
    /// Names in [`RESERVED_FIELDS`] are dropped.
    pub fn merge(&mut self, data: Metadata, now_millis: i64) {
        for (key, value) in data {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            self.fields.insert(key, value);
        }
        self.last_updated = now_millis;
    }
}

/// Combined view returned by
/// [`CredentialCache::get_address_data`](crate::cache::CredentialCache::get_address_data).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressData {
    #[serde(flatten)]
    pub fields: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    pub has_keys: bool,
    pub keys: Option<CachedCredentials>,
}

impl AddressData {
    /// Look up a caller-supplied metadata field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
