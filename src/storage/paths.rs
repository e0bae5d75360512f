// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path utilities for the file-backed record layout.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::{CACHE_DIR_ENV, DEFAULT_CACHE_DIR};

/// Storage path utilities for file-backed records.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root taken from `KEY_CACHE_DIR`, falling back to the default.
    pub fn from_env() -> Self {
        match env::var(CACHE_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }

    /// Root directory for all records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the JSON file backing a record.
    pub fn record(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Scratch file used for atomic replacement of a record.
    pub fn record_temp(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json.tmp"))
    }
}
