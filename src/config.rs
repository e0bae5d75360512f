// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`CacheConfig`] used to construct a
//! [`CredentialCache`](crate::cache::CredentialCache).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KEY_CACHE_TTL_MINUTES` | Lifetime of a cached credential | `30` |
//! | `KEY_CACHE_SECURE_MODE` | Refuse to retain private keys (`true`/`false`) | `true` |
//! | `KEY_CACHE_MAX_RETRIES` | Store attempts allowed per address | `3` |
//! | `KEY_CACHE_DIR` | Root directory for [`FileStorage`](crate::storage::FileStorage) | `./.key-cache` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::time::Duration;

use tracing::warn;

/// Environment variable name for the credential time-to-live, in minutes.
pub const TTL_MINUTES_ENV: &str = "KEY_CACHE_TTL_MINUTES";

/// Environment variable name for the secure mode switch.
///
/// Accepts `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`.
pub const SECURE_MODE_ENV: &str = "KEY_CACHE_SECURE_MODE";

/// Environment variable name for the per-address store attempt cap.
pub const MAX_RETRIES_ENV: &str = "KEY_CACHE_MAX_RETRIES";

/// Environment variable name for the file storage root directory.
pub const CACHE_DIR_ENV: &str = "KEY_CACHE_DIR";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default credential lifetime in minutes.
pub const DEFAULT_TTL_MINUTES: u64 = 30;

/// Default number of store attempts per address.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default file storage root, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "./.key-cache";

/// Construction parameters for a credential cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a stored credential stays valid.
    pub ttl: Duration,
    /// When set, private keys are never retained, persisted or returned.
    pub secure_mode: bool,
    /// Maximum `retryCount` an entry may reach.
    pub max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_MINUTES * 60),
            secure_mode: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CacheConfig {
    /// Load configuration from the environment.
    ///
    /// Missing variables use the defaults. Unparsable values are logged and
    /// also fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ttl = match env::var(TTL_MINUTES_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>().ok().and_then(minutes_to_duration) {
                Some(ttl) => ttl,
                None => {
                    warn!(var = TTL_MINUTES_ENV, value = %raw, "Invalid TTL, using default");
                    defaults.ttl
                }
            },
            Err(_) => defaults.ttl,
        };

        let secure_mode = match env::var(SECURE_MODE_ENV) {
            Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!(var = SECURE_MODE_ENV, value = %raw, "Invalid secure mode flag, using default");
                defaults.secure_mode
            }),
            Err(_) => defaults.secure_mode,
        };

        let max_retries = match env::var(MAX_RETRIES_ENV) {
            Ok(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(var = MAX_RETRIES_ENV, value = %raw, "Invalid retry cap, using default");
                defaults.max_retries
            }),
            Err(_) => defaults.max_retries,
        };

        Self {
            ttl,
            secure_mode,
            max_retries,
        }
    }

    /// Set the TTL in whole minutes. Saturates on overflow.
    pub fn with_ttl_minutes(mut self, minutes: u64) -> Self {
        self.ttl = Duration::from_secs(minutes.saturating_mul(60));
        self
    }

    /// Set the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable secure mode.
    pub fn with_secure_mode(mut self, enabled: bool) -> Self {
        self.secure_mode = enabled;
        self
    }

    /// Set the per-address store attempt cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// TTL in milliseconds, the unit stored timestamps use.
    pub fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

fn minutes_to_duration(minutes: u64) -> Option<Duration> {
    minutes.checked_mul(60).map(Duration::from_secs)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(30 * 60));
        assert!(config.secure_mode);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.ttl_millis(), 1_800_000);
    }

    #[test]
    fn builders_override_fields() {
        let config = CacheConfig::default()
            .with_ttl_minutes(5)
            .with_secure_mode(false)
            .with_max_retries(10);
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert!(!config.secure_mode);
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn huge_ttl_minutes_saturate() {
        let config = CacheConfig::default().with_ttl_minutes(u64::MAX / 10);
        assert_eq!(config.ttl, Duration::from_secs(u64::MAX));
        assert_eq!(config.ttl_millis(), i64::MAX);
    }

    #[test]
    fn minutes_to_duration_rejects_overflow() {
        assert_eq!(minutes_to_duration(2), Some(Duration::from_secs(120)));
        assert_eq!(minutes_to_duration(307_445_734_561_825_861), None);
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn from_env_reads_and_falls_back() {
        // Single test touches these vars to avoid races between tests.
        env::set_var(TTL_MINUTES_ENV, "12");
        env::set_var(SECURE_MODE_ENV, "false");
        env::set_var(MAX_RETRIES_ENV, "not-a-number");

        let config = CacheConfig::from_env();
        assert_eq!(config.ttl, Duration::from_secs(12 * 60));
        assert!(!config.secure_mode);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);

        env::set_var(TTL_MINUTES_ENV, "307445734561825861");
        assert_eq!(CacheConfig::from_env().ttl, CacheConfig::default().ttl);

        env::remove_var(TTL_MINUTES_ENV);
        env::remove_var(SECURE_MODE_ENV);
        env::remove_var(MAX_RETRIES_ENV);

        assert_eq!(CacheConfig::from_env(), CacheConfig::default());
    }
}
