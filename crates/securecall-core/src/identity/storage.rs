//! Storage abstraction for identity key material
//!
//! Synchronous key-value storage used only by the identity store. Ships an
//! in-memory implementation for tests and embedding, and a directory-backed one
//! for native installs.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::errors::StorageError;

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Durable key-value storage for identity data
pub trait KeyStorage: Send + Sync {
    /// Load the bytes stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `data` under `key`, replacing any previous value
    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete the value under `key`; missing keys are not an error
    fn delete(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyStorage + ?Sized> KeyStorage for Box<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).save(key, data)
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

// ----------------------------------------------------------------------------
// Memory Storage Implementation
// ----------------------------------------------------------------------------

/// In-memory storage for tests and fallback
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: BTreeMap<String, Vec<u8>>,
    available: bool,
    writes: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            available: true,
            writes: 0,
        }
    }

    /// Storage that fails every operation
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Number of successful `save` calls
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Overwrite a slot without counting it as a write (corruption in tests)
    pub fn insert_raw(&mut self, key: &str, data: Vec<u8>) {
        self.data.insert(key.to_string(), data);
    }
}

impl KeyStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.available {
            return Err(StorageError::NotAvailable);
        }
        Ok(self.data.get(key).cloned())
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::NotAvailable);
        }
        self.data.insert(key.to_string(), data.to_vec());
        self.writes += 1;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::NotAvailable);
        }
        self.data.remove(key);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Storage Implementation
// ----------------------------------------------------------------------------

/// One file per key inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written key behind.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Use `root` as the storage directory, creating it if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(format!("{}.key", key)))
    }
}

impl KeyStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("key.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
