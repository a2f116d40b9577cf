//! In-memory key-value storage for testing.

use crate::backend::KeyValueStorage;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory key-value storage.
///
/// This storage keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// An optional byte quota makes writes fail the way a full browser
/// storage does, which is how the quota-exceeded paths are tested.
///
/// # Thread Safety
///
/// This storage is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use deskstore_storage::{KeyValueStorage, InMemoryStorage};
///
/// let storage = InMemoryStorage::with_quota(8);
/// storage.set("a", "1234").unwrap();
/// assert!(storage.set("b", "123456789").unwrap_err().is_quota_exceeded());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<u64>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory storage limited to `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Creates a new in-memory storage with pre-existing entries.
    ///
    /// Useful for testing recovery of hand-crafted or corrupt values.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            quota: None,
        }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

impl KeyValueStorage for InMemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();

        if let Some(quota) = self.quota {
            let current: u64 = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
            let replaced = entries.get(key).map_or(0, |old| entry_size(key, old));
            let requested = current - replaced + entry_size(key, value);
            if requested > quota {
                return Err(StorageError::QuotaExceeded { requested, quota });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn usage_bytes(&self) -> StorageResult<u64> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum())
    }
}
