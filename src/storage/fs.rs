// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File-backed record storage.
//!
//! Each record is one JSON file under the storage root. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! leaves either the old or the new record, never a truncated one.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};

use super::{KeyValueStorage, StoragePaths, StorageError, StorageResult};

/// Key-value storage on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStorage {
    paths: StoragePaths,
    initialized: bool,
}

impl FileStorage {
    /// Create a new FileStorage instance.
    ///
    /// Does NOT create the root directory. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    /// Create and initialize storage rooted at `KEY_CACHE_DIR`.
    pub fn open_from_env() -> StorageResult<Self> {
        let mut storage = Self::new(StoragePaths::from_env());
        storage.initialize()?;
        Ok(storage)
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Check if storage is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Create the root directory. Safe to call multiple times.
    pub fn initialize(&mut self) -> StorageResult<()> {
        fs::create_dir_all(self.paths.root())?;
        self.initialized = true;
        Ok(())
    }

    fn ensure_ready(&self, key: &str) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_ready(key)?;

        let mut file = match File::open(self.paths.record(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(Some(content))
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_ready(key)?;

        let path = self.paths.record(key);
        let temp_path = self.paths.record_temp(key);
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(value.as_bytes())?;
            writer.flush()?;
        }

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.ensure_ready(key)?;

        match fs::remove_file(self.paths.record(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
