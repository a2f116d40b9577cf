//! Owner export and import.
//!
//! A snapshot captures the raw stored value of every registered module for
//! one owner. It is meant for backup and migration between installations,
//! not for synchronization.
//!
//! ## Snapshot Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "ownerId": "u1",
//!   "exportedAt": "2026-10-17T09:30:00.000Z",
//!   "modules": { "todos": [...], "settings": {...}, "groups": null, ... }
//! }
//! ```
//!
//! `null` marks a module with no stored data.

use crate::clock::format_timestamp;
use crate::error::{CoreError, CoreResult};
use crate::store::RecordStore;
use deskstore_storage::KeyValueStorage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// All registered modules of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// Owner the data was exported from.
    pub owner_id: String,
    /// Export time, ISO-8601.
    pub exported_at: String,
    /// Raw parsed value per module, `null` when absent.
    pub modules: BTreeMap<String, Value>,
}

/// What an import changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Modules whose data was written.
    pub written: Vec<String>,
    /// Modules whose data was removed because the snapshot had none.
    pub removed: Vec<String>,
    /// Snapshot modules that are not in the registry and were skipped.
    pub ignored: Vec<String>,
}

impl<S: KeyValueStorage> RecordStore<S> {
    /// Captures every registered module of `owner_id`.
    ///
    /// Values that cannot be parsed are exported as `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner id is invalid or storage cannot be read.
    pub fn export_snapshot(&self, owner_id: &str) -> CoreResult<Snapshot> {
        let mut modules = BTreeMap::new();
        for module in &self.config.modules {
            let key = self.keys.collection(module, owner_id)?;
            let value = match self.storage.get(&key)? {
                None => Value::Null,
                Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                    warn!(key = %key, error = %e, "skipping malformed module in export");
                    Value::Null
                }),
            };
            modules.insert(module.clone(), value);
        }

        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            owner_id: owner_id.to_string(),
            exported_at: format_timestamp(self.clock.now()),
            modules,
        })
    }

    /// Serializes every registered module of `owner_id` into one JSON
    /// document.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::export_snapshot`].
    pub fn export_all(&self, owner_id: &str) -> CoreResult<String> {
        Ok(serde_json::to_string(&self.export_snapshot(owner_id)?)?)
    }

    /// Restores a snapshot into `owner_id`, replacing each registered
    /// module's data.
    ///
    /// Modules that are `null` or missing from the snapshot are removed. The
    /// whole cache is cleared. The pending-sync ledger is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSnapshot`] for an unsupported version, or
    /// a storage error if a write fails part-way.
    pub fn import_snapshot(&self, snapshot: &Snapshot, owner_id: &str) -> CoreResult<ImportOutcome> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CoreError::InvalidSnapshot {
                message: format!(
                    "unsupported version {} (expected {SNAPSHOT_VERSION})",
                    snapshot.version
                ),
            });
        }
        crate::keys::validate_owner(owner_id)?;

        let mut outcome = ImportOutcome {
            ignored: snapshot
                .modules
                .keys()
                .filter(|m| !self.config.is_registered(m))
                .cloned()
                .collect(),
            ..ImportOutcome::default()
        };

        let result = self.write_modules(snapshot, owner_id, &mut outcome);
        self.cache.clear();
        result?;

        info!(
            owner_id,
            written = outcome.written.len(),
            removed = outcome.removed.len(),
            "snapshot imported"
        );
        Ok(outcome)
    }

    /// Parses and restores a document produced by
    /// [`RecordStore::export_all`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSnapshot`] if the document cannot be
    /// parsed, otherwise see [`RecordStore::import_snapshot`].
    pub fn import_all(&self, serialized: &str, owner_id: &str) -> CoreResult<ImportOutcome> {
        let snapshot: Snapshot =
            serde_json::from_str(serialized).map_err(|e| CoreError::InvalidSnapshot {
                message: e.to_string(),
            })?;
        self.import_snapshot(&snapshot, owner_id)
    }

    fn write_modules(
        &self,
        snapshot: &Snapshot,
        owner_id: &str,
        outcome: &mut ImportOutcome,
    ) -> CoreResult<()> {
        for module in &self.config.modules {
            let key = self.keys.collection(module, owner_id)?;
            match snapshot.modules.get(module) {
                Some(value) if !value.is_null() => {
                    self.storage.set(&key, &serde_json::to_string(value)?)?;
                    outcome.written.push(module.clone());
                }
                _ => {
                    if self.storage.contains(&key)? {
                        self.storage.remove(&key)?;
                        outcome.removed.push(module.clone());
                    }
                }
            }
        }
        Ok(())
    }
}
