//! Key-value storage trait definition.

use crate::error::StorageResult;

/// A persistent string key-value store.
///
/// Storages are **opaque string maps**. They provide get/set/remove over
/// whole values. DeskStore owns the key layout and value format - storages
/// do not understand records, modules or owners.
///
/// # Invariants
///
/// - `set` replaces the whole value stored under a key
/// - `get` returns exactly the string previously passed to `set`
/// - `remove` of an absent key is not an error
/// - A failed `set` leaves the previous value untouched
/// - Storages must be `Send + Sync` and usable through a shared reference
///
/// # Implementors
///
/// - [`super::InMemoryStorage`] - For testing
/// - [`super::FileStorage`] - For persistent storage
pub trait KeyValueStorage: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The write would exceed the storage quota
    /// - An I/O error occurs
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Returns every key currently stored, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Returns the number of bytes used by keys and values.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn usage_bytes(&self) -> StorageResult<u64>;

    /// Returns true if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be read.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for std::sync::Arc<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }

    fn usage_bytes(&self) -> StorageResult<u64> {
        (**self).usage_bytes()
    }
}
