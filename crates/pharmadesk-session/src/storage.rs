//! Durable key-value stores
//!
//! [`MemoryStore`] backs tests and the mock backend. [`FileStore`] keeps a
//! JSON map on disk so the last-activity record survives restarts of the
//! shell, the way browser local storage survives page reloads.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::StorageError;
use crate::ports::KeyValueStore;

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Failed to lock store: {}", e)))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// JSON-file backed store
///
/// The whole map is cached in memory and rewritten on every mutation.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`
    pub fn open(path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let cache = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    StorageError::Corrupted(format!("Failed to parse {:?}: {}", path, e))
                })?
            }
        } else {
            HashMap::new()
        };

        debug!("Opened file store at {:?} ({} keys)", path, cache.len());

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn cache(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.cache
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Failed to lock store: {}", e)))
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Corrupted(format!("Failed to serialize: {}", e)))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.cache()?;
        let previous = cache.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&cache) {
            // Keep the cache in step with the file
            match previous {
                Some(old) => cache.insert(key.to_string(), old),
                None => cache.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.cache()?;
        if let Some(previous) = cache.remove(key) {
            if let Err(e) = self.persist(&cache) {
                cache.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}
