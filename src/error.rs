// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types for the credential cache.
//!
//! Validation and capacity failures never cross the cache boundary as hard
//! errors: [`CredentialCache::store`](crate::cache::CredentialCache::store)
//! reduces a [`StoreRejection`] to `false`. Only programmer misuse surfaces as
//! a [`CacheError`].

/// Hard errors signalled by cache mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// A mutation was called without a wallet address.
    #[error("User address is required")]
    MissingAddress,
}

/// Reasons a store attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreRejection {
    /// Address or public key was empty.
    #[error("User address and public key are required")]
    MissingField,

    /// Address is not `0x` followed by 40 hex digits.
    #[error("Invalid Ethereum address format: {0}")]
    InvalidAddress(String),

    /// Signature is not `0x` followed by 130 hex digits.
    #[error("Invalid signature format")]
    InvalidSignature,

    /// The address already used up its store attempts.
    #[error("Maximum retry attempts exceeded for address {address} ({attempts}/{max_retries})")]
    RetryLimitExceeded {
        address: String,
        attempts: u32,
        max_retries: u32,
    },
}

impl StoreRejection {
    /// Stable code for UI messaging ("invalid input" vs "too many attempts").
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreRejection::MissingField => "missing_field",
            StoreRejection::InvalidAddress(_) => "invalid_address",
            StoreRejection::InvalidSignature => "invalid_signature",
            StoreRejection::RetryLimitExceeded { .. } => "retry_limit_exceeded",
        }
    }

    /// True when the rejection is about input shape rather than capacity.
    pub fn is_validation(&self) -> bool {
        !matches!(self, StoreRejection::RetryLimitExceeded { .. })
    }
}
