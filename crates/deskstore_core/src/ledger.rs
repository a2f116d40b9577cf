//! Pending-sync ledger.
//!
//! The ledger is the persisted set of (module, owner) pairs whose latest
//! local write has not been confirmed by the remote store. The record store
//! adds pairs on every local write; the sync coordinator removes them once
//! the remote store has accepted the data.

use crate::error::CoreResult;
use deskstore_storage::KeyValueStorage;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// One (module, owner) pair in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerEntry {
    /// Module name.
    pub module: String,
    /// Owner id.
    pub owner_id: String,
}

impl LedgerEntry {
    /// Creates an entry.
    pub fn new(module: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            owner_id: owner_id.into(),
        }
    }

    /// Parses the persisted `"<module>_<ownerId>"` form.
    ///
    /// Module names never contain `_`, so the first `_` is the separator.
    pub fn parse(text: &str) -> Option<Self> {
        let (module, owner_id) = text.split_once('_')?;
        if module.is_empty() || owner_id.is_empty() {
            return None;
        }
        Some(Self::new(module, owner_id))
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.module, self.owner_id)
    }
}

/// The persisted set of pairs awaiting remote confirmation.
pub struct PendingSyncLedger<S: KeyValueStorage> {
    storage: Arc<S>,
    key: String,
    lock: Mutex<()>,
}

impl<S: KeyValueStorage> PendingSyncLedger<S> {
    /// Creates a ledger persisted under `key`.
    pub fn new(storage: Arc<S>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns every entry, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn entries(&self) -> CoreResult<Vec<LedgerEntry>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.into_iter().collect())
    }

    /// Returns true if the pair is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn contains(&self, module: &str, owner_id: &str) -> CoreResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.read()?.contains(&LedgerEntry::new(module, owner_id)))
    }

    /// Adds a pair. Adding a pair twice keeps one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub fn mark(&self, module: &str, owner_id: &str) -> CoreResult<()> {
        let _guard = self.lock.lock();
        let mut set = self.read()?;
        if set.insert(LedgerEntry::new(module, owner_id)) {
            self.write(&set)?;
        }
        Ok(())
    }

    /// Removes a pair. Returns true if it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub fn clear(&self, module: &str, owner_id: &str) -> CoreResult<bool> {
        let _guard = self.lock.lock();
        let mut set = self.read()?;
        let removed = set.remove(&LedgerEntry::new(module, owner_id));
        if removed {
            self.write(&set)?;
        }
        Ok(removed)
    }

    /// Removes every pair belonging to `owner_id`. Returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub fn clear_owner(&self, owner_id: &str) -> CoreResult<usize> {
        let _guard = self.lock.lock();
        let mut set = self.read()?;
        let before = set.len();
        set.retain(|e| e.owner_id != owner_id);
        let removed = before - set.len();
        if removed > 0 {
            self.write(&set)?;
        }
        Ok(removed)
    }

    fn read(&self) -> CoreResult<BTreeSet<LedgerEntry>> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(BTreeSet::new());
        };
        let items: Vec<String> = match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(key = %self.key, error = %e, "discarding unreadable pending-sync ledger");
                return Ok(BTreeSet::new());
            }
        };
        Ok(items.iter().filter_map(|s| LedgerEntry::parse(s)).collect())
    }

    fn write(&self, set: &BTreeSet<LedgerEntry>) -> CoreResult<()> {
        let items: Vec<String> = set.iter().map(ToString::to_string).collect();
        self.storage.set(&self.key, &serde_json::to_string(&items)?)?;
        Ok(())
    }
}

impl<S: KeyValueStorage> fmt::Debug for PendingSyncLedger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSyncLedger")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
