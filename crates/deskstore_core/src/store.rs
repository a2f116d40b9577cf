//! The record store: owner- and module-scoped CRUD over key-value storage.

use crate::bulk::{BulkAction, BulkOutcome, BulkRequest};
use crate::cache::CollectionCache;
use crate::clock::{format_timestamp, next_stamp, Clock, SystemClock};
use crate::config::{CorruptionPolicy, StoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::id::IdGenerator;
use crate::identity::IdentityProvider;
use crate::keys::KeyLayout;
use crate::ledger::PendingSyncLedger;
use crate::query::{Query, QueryPage};
use crate::types::{payload_only, Fields, Record, SyncStatus};
use deskstore_storage::KeyValueStorage;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Where the records returned by [`RecordStore::load_detailed`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// A valid cache entry.
    Cache,
    /// Parsed from storage (and now cached).
    Storage,
    /// Nothing stored under the key; the default was returned.
    Missing,
    /// The stored value was malformed and has been quarantined; the default
    /// was returned.
    Quarantined,
    /// The stored value is valid JSON but not a record collection, for
    /// example a settings object written through [`RecordStore::write_raw`].
    /// It is left in place; the default was returned.
    Unrecognized,
}

/// Records plus their provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// The collection.
    pub records: Vec<Record>,
    /// Where it came from.
    pub source: LoadSource,
}

/// Storage used by one module of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleUsage {
    /// Module name.
    pub module: String,
    /// Number of records, 0 if the stored value is not a record list.
    pub records: usize,
    /// Bytes used by key and value.
    pub bytes: u64,
}

/// Storage used by one owner across the module registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerUsage {
    /// Owner id.
    pub owner_id: String,
    /// Registered modules holding data.
    pub modules: Vec<ModuleUsage>,
    /// Sum of all module bytes.
    pub total_bytes: u64,
    /// Bytes used by the whole storage, every owner included.
    pub storage_bytes: u64,
}

enum Parsed<T> {
    Present(T),
    Missing,
    Quarantined,
    Unrecognized,
}

/// Owner- and module-scoped record store.
///
/// A `RecordStore` is built once at startup and shared (typically behind an
/// `Arc`) by every feature module; it owns the collection cache, the id
/// generator and the pending-sync ledger.
///
/// Every write replaces the whole module collection. Writes hold a
/// per-collection lock (mutations across their whole read-modify-write)
/// unless [`StoreConfig::serialize_writes`] is disabled.
pub struct RecordStore<S: KeyValueStorage> {
    pub(crate) storage: Arc<S>,
    pub(crate) config: StoreConfig,
    pub(crate) keys: KeyLayout,
    pub(crate) cache: CollectionCache,
    ledger: PendingSyncLedger<S>,
    ids: IdGenerator,
    pub(crate) clock: Arc<dyn Clock>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KeyValueStorage> RecordStore<S> {
    /// Opens a store over `storage` with the system clock.
    pub fn open(storage: S, config: StoreConfig) -> Self {
        Self::with_shared(Arc::new(storage), config)
    }

    /// Opens a store over shared storage with the system clock.
    pub fn with_shared(storage: Arc<S>, config: StoreConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids = IdGenerator::with_clock(clock.clone());
        Self::with_parts(storage, config, clock, ids)
    }

    /// Opens a store from explicit parts. Tests use this to inject a manual
    /// clock and a seeded id generator.
    pub fn with_parts(
        storage: Arc<S>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        ids: IdGenerator,
    ) -> Self {
        let keys = KeyLayout::new(config.key_prefix.clone());
        let ledger = PendingSyncLedger::new(storage.clone(), keys.ledger());
        let cache = CollectionCache::new(config.cache_ttl, clock.clone());
        Self {
            storage,
            config,
            keys,
            cache,
            ledger,
            ids,
            clock,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Returns the key layout.
    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    /// Returns the collection cache.
    pub fn cache(&self) -> &CollectionCache {
        &self.cache
    }

    /// Returns the pending-sync ledger.
    pub fn ledger(&self) -> &PendingSyncLedger<S> {
        &self.ledger
    }

    /// Returns the clock used for timestamps.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Loads a module collection, or an empty one if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, storage cannot be read, or
    /// the stored value is malformed under [`CorruptionPolicy::Fail`].
    pub fn load(&self, module: &str, owner_id: &str) -> CoreResult<Vec<Record>> {
        self.load_or(module, owner_id, Vec::new())
    }

    /// Loads a module collection, or `default` if nothing usable is stored.
    ///
    /// `default` is not written back.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn load_or(
        &self,
        module: &str,
        owner_id: &str,
        default: Vec<Record>,
    ) -> CoreResult<Vec<Record>> {
        let outcome = self.load_detailed(module, owner_id)?;
        Ok(match outcome.source {
            LoadSource::Missing | LoadSource::Quarantined | LoadSource::Unrecognized => default,
            LoadSource::Cache | LoadSource::Storage => outcome.records,
        })
    }

    /// Loads a module collection and reports where it came from.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn load_detailed(&self, module: &str, owner_id: &str) -> CoreResult<LoadOutcome> {
        let key = self.keys.collection(module, owner_id)?;

        if let Some(records) = self.cache.get(&key) {
            debug!(key = %key, "collection cache hit");
            return Ok(LoadOutcome {
                records,
                source: LoadSource::Cache,
            });
        }
        debug!(key = %key, "collection cache miss");

        let ticket = self.cache.ticket(&key);
        Ok(match self.read_parsed::<Vec<Record>>(module, owner_id, &key)? {
            Parsed::Present(records) => {
                if !self.cache.put_if_current(&key, records.clone(), ticket) {
                    debug!(key = %key, "collection written during load, snapshot not cached");
                }
                LoadOutcome {
                    records,
                    source: LoadSource::Storage,
                }
            }
            Parsed::Missing => LoadOutcome {
                records: Vec::new(),
                source: LoadSource::Missing,
            },
            Parsed::Quarantined => LoadOutcome {
                records: Vec::new(),
                source: LoadSource::Quarantined,
            },
            Parsed::Unrecognized => LoadOutcome {
                records: Vec::new(),
                source: LoadSource::Unrecognized,
            },
        })
    }

    /// Returns the record with `id`, or `None`.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn get_by_id(&self, module: &str, owner_id: &str, id: &str) -> CoreResult<Option<Record>> {
        Ok(self
            .load(module, owner_id)?
            .into_iter()
            .find(|record| record.id == id))
    }

    /// Runs `query` over a module collection. Never writes.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn query(&self, module: &str, owner_id: &str, query: &Query) -> CoreResult<QueryPage> {
        Ok(query.apply(self.load(module, owner_id)?))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replaces a module collection with `records`.
    ///
    /// Records without `updatedAt` are stamped with the current time, every
    /// record is marked [`SyncStatus::Local`], the cache entry is dropped and
    /// the (module, owner) pair is added to the pending-sync ledger.
    ///
    /// Returns the records as written.
    ///
    /// # Errors
    ///
    /// Returns an error if two records share an id, or if the write fails
    /// (for example when the storage quota is exceeded). On error nothing
    /// has been written.
    pub fn save(&self, module: &str, owner_id: &str, records: Vec<Record>) -> CoreResult<Vec<Record>> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());
        self.write_collection(module, owner_id, &key, records)
    }

    // Callers hold the collection lock.
    fn write_collection(
        &self,
        module: &str,
        owner_id: &str,
        key: &str,
        records: Vec<Record>,
    ) -> CoreResult<Vec<Record>> {
        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.id.as_str())) {
            return Err(CoreError::DuplicateId { id: dup.id.clone() });
        }

        let now = format_timestamp(self.clock.now());
        let mut records = records;
        for record in &mut records {
            if record.updated_at.is_none() {
                record.updated_at = Some(now.clone());
            }
            if record.owner_id.is_empty() {
                record.owner_id = owner_id.to_string();
            }
            record.sync_status = SyncStatus::Local;
        }

        let serialized = serde_json::to_string(&records)?;
        if let Err(e) = self.storage.set(key, &serialized) {
            error!(key, error = %e, "failed to write collection");
            return Err(e.into());
        }
        self.cache.invalidate(key);
        self.mark_pending(module, owner_id);

        debug!(key, records = records.len(), "collection saved");
        Ok(records)
    }

    /// Creates a record from `partial` and returns it.
    ///
    /// Reserved fields in `partial` are ignored: the id, owner and
    /// timestamps are generated by the store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotACollection`] if the module holds a value that
    /// is not a record collection, or any error from [`RecordStore::save`].
    pub fn create(&self, module: &str, owner_id: &str, partial: Fields) -> CoreResult<Record> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());

        let mut records = self.load_for_write(module, owner_id, &key)?;

        let mut id = self.ids.generate();
        while records.iter().any(|r| r.id == id) {
            id = self.ids.generate();
        }

        let stamp = format_timestamp(self.clock.now());
        let record = Record {
            id,
            owner_id: owner_id.to_string(),
            created_at: Some(stamp.clone()),
            updated_at: Some(stamp),
            sync_status: SyncStatus::Local,
            fields: payload_only(partial),
        };
        records.push(record.clone());

        self.write_collection(module, owner_id, &key, records)?;
        Ok(record)
    }

    /// Merges `patch` over the record with `id` and returns the result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] if no record has `id`, or any
    /// error from [`RecordStore::save`].
    pub fn update(&self, module: &str, owner_id: &str, id: &str, patch: &Fields) -> CoreResult<Record> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());

        let mut records = self.load_for_write(module, owner_id, &key)?;
        let now = self.clock.now();

        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::not_found(module, id))?;
        record.apply_patch(patch);
        record.updated_at = Some(next_stamp(now, record.updated_at.as_deref()));
        let updated = record.clone();

        let saved = self.write_collection(module, owner_id, &key, records)?;
        Ok(saved
            .into_iter()
            .find(|r| r.id == id)
            .unwrap_or(updated))
    }

    /// Removes the record with `id` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] if no record has `id`; nothing
    /// is written in that case.
    pub fn delete(&self, module: &str, owner_id: &str, id: &str) -> CoreResult<Record> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());

        let records = self.load_for_write(module, owner_id, &key)?;
        let (removed, kept): (Vec<Record>, Vec<Record>) =
            records.into_iter().partition(|r| r.id == id);

        let Some(removed) = removed.into_iter().next() else {
            return Err(CoreError::not_found(module, id));
        };

        self.write_collection(module, owner_id, &key, kept)?;
        Ok(removed)
    }

    /// Applies one mutation to every listed id with a single write.
    ///
    /// Ids that do not exist are skipped. When no id matches nothing is
    /// written and the outcome reports zero affected records. If the write
    /// fails, none of the mutations are applied.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::save`].
    pub fn bulk(&self, module: &str, owner_id: &str, request: &BulkRequest) -> CoreResult<BulkOutcome> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());

        let targets: HashSet<&str> = request.ids.iter().map(String::as_str).collect();
        let mut records = self.load_for_write(module, owner_id, &key)?;
        let now = self.clock.now();

        let affected = match request.action {
            BulkAction::Delete => {
                let before = records.len();
                records.retain(|r| !targets.contains(r.id.as_str()));
                before - records.len()
            }
            BulkAction::Update | BulkAction::Archive => {
                let mut affected = 0;
                for record in records.iter_mut().filter(|r| targets.contains(r.id.as_str())) {
                    if request.action == BulkAction::Update {
                        record.apply_patch(&request.data);
                    }
                    let stamp = next_stamp(now, record.updated_at.as_deref());
                    if request.action == BulkAction::Archive {
                        record.fields.insert("archived".into(), Value::Bool(true));
                        record
                            .fields
                            .insert("archivedAt".into(), Value::String(stamp.clone()));
                    }
                    record.updated_at = Some(stamp);
                    affected += 1;
                }
                affected
            }
        };

        if affected > 0 {
            self.write_collection(module, owner_id, &key, records)?;
        }

        debug!(key = %key, action = ?request.action, affected, "bulk operation applied");
        Ok(BulkOutcome {
            action: request.action,
            affected,
        })
    }

    /// Removes every registered module collection of `owner_id`, together
    /// with the owner's ledger entries. Returns how many collections existed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be modified.
    pub fn clear_owner(&self, owner_id: &str) -> CoreResult<usize> {
        let mut removed = 0;
        for module in &self.config.modules {
            let key = self.keys.collection(module, owner_id)?;
            if self.storage.contains(&key)? {
                self.storage.remove(&key)?;
                removed += 1;
            }
            self.cache.invalidate(&key);
        }
        self.ledger.clear_owner(owner_id)?;
        debug!(owner_id, removed, "owner data cleared");
        Ok(removed)
    }

    /// Reports how much storage each registered module of `owner_id` uses.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn owner_usage(&self, owner_id: &str) -> CoreResult<OwnerUsage> {
        let mut modules = Vec::new();
        for module in &self.config.modules {
            let key = self.keys.collection(module, owner_id)?;
            let Some(raw) = self.storage.get(&key)? else {
                continue;
            };
            let records = serde_json::from_str::<Vec<Value>>(&raw).map_or(0, |v| v.len());
            modules.push(ModuleUsage {
                module: module.clone(),
                records,
                bytes: (key.len() + raw.len()) as u64,
            });
        }
        let total_bytes = modules.iter().map(|m| m.bytes).sum();
        Ok(OwnerUsage {
            owner_id: owner_id.to_string(),
            modules,
            total_bytes,
            storage_bytes: self.storage.usage_bytes()?,
        })
    }

    // ------------------------------------------------------------------
    // Raw mirror primitives
    // ------------------------------------------------------------------

    /// Reads the raw JSON stored for (module, owner).
    ///
    /// Any valid JSON is returned as is. Malformed values are handled by
    /// the corruption policy.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn read_raw(&self, module: &str, owner_id: &str) -> CoreResult<Option<Value>> {
        let key = self.keys.collection(module, owner_id)?;
        Ok(match self.read_parsed::<Value>(module, owner_id, &key)? {
            Parsed::Present(value) => Some(value),
            Parsed::Missing | Parsed::Quarantined | Parsed::Unrecognized => None,
        })
    }

    /// Writes a raw JSON payload for (module, owner) and marks the pair as
    /// pending synchronization.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_raw(&self, module: &str, owner_id: &str, value: &Value) -> CoreResult<()> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());
        self.mirror_raw(module, owner_id, value)?;
        self.mark_pending(module, owner_id);
        Ok(())
    }

    /// Clears the pending mark of (module, owner) if the stored payload
    /// still equals `expected` (`None`: nothing stored). Returns true if the
    /// pair was cleared.
    ///
    /// The comparison runs under the collection lock, so a write that
    /// landed after `expected` was read keeps the pair pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or storage cannot be read or
    /// written.
    pub fn settle_pending(
        &self,
        module: &str,
        owner_id: &str,
        expected: Option<&Value>,
    ) -> CoreResult<bool> {
        let key = self.keys.collection(module, owner_id)?;
        let lock = self.collection_lock(&key);
        let _guard = lock.as_ref().map(|l| l.lock());

        let current = match self.read_parsed::<Value>(module, owner_id, &key)? {
            Parsed::Present(value) => Some(value),
            Parsed::Missing | Parsed::Quarantined | Parsed::Unrecognized => None,
        };
        if current.as_ref() != expected {
            debug!(key = %key, "payload changed since it was read, pair stays pending");
            return Ok(false);
        }
        self.ledger.clear(module, owner_id)?;
        Ok(true)
    }

    /// Writes a raw JSON payload for (module, owner) without touching the
    /// ledger. Used for data that came from the remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn mirror_raw(&self, module: &str, owner_id: &str, value: &Value) -> CoreResult<()> {
        let key = self.keys.collection(module, owner_id)?;
        let serialized = serde_json::to_string(value)?;
        if let Err(e) = self.storage.set(&key, &serialized) {
            error!(key = %key, error = %e, "failed to write mirrored payload");
            return Err(e.into());
        }
        self.cache.invalidate(&key);
        Ok(())
    }

    /// Removes the value stored for (module, owner). Returns true if
    /// something was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be modified.
    pub fn remove_raw(&self, module: &str, owner_id: &str) -> CoreResult<bool> {
        let key = self.keys.collection(module, owner_id)?;
        let existed = self.storage.contains(&key)?;
        self.storage.remove(&key)?;
        self.cache.invalidate(&key);
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // Identity scoping
    // ------------------------------------------------------------------

    /// Returns a view of the store bound to the signed-in owner.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSignedIn`] if nobody is signed in.
    pub fn scoped(&self, identity: &dyn IdentityProvider) -> CoreResult<OwnerScope<'_, S>> {
        let owner_id = identity.current_user().ok_or(CoreError::NotSignedIn)?;
        crate::keys::validate_owner(&owner_id)?;
        Ok(OwnerScope {
            store: self,
            owner_id,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn collection_lock(&self, key: &str) -> Option<Arc<Mutex<()>>> {
        if !self.config.serialize_writes {
            return None;
        }
        let mut locks = self.write_locks.lock();
        Some(locks.entry(key.to_string()).or_default().clone())
    }

    fn mark_pending(&self, module: &str, owner_id: &str) {
        if let Err(e) = self.ledger.mark(module, owner_id) {
            warn!(module, owner_id, error = %e, "failed to record pending sync");
        }
    }

    fn load_for_write(&self, module: &str, owner_id: &str, key: &str) -> CoreResult<Vec<Record>> {
        let outcome = self.load_detailed(module, owner_id)?;
        if outcome.source == LoadSource::Unrecognized {
            return Err(CoreError::NotACollection {
                key: key.to_string(),
            });
        }
        Ok(outcome.records)
    }

    // Only unparseable text counts as malformed. Valid JSON of another shape
    // belongs to whoever wrote it and is never moved.
    fn read_parsed<T: serde::de::DeserializeOwned>(
        &self,
        module: &str,
        owner_id: &str,
        key: &str,
    ) -> CoreResult<Parsed<T>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(Parsed::Missing);
        };
        let value = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(e) => {
                return self
                    .handle_corrupt(module, owner_id, key, &raw, &e)
                    .map(|()| Parsed::Quarantined)
            }
        };
        match serde_json::from_value::<T>(value) {
            Ok(parsed) => Ok(Parsed::Present(parsed)),
            Err(e) => {
                debug!(key, error = %e, "stored value is not a record collection");
                Ok(Parsed::Unrecognized)
            }
        }
    }

    fn handle_corrupt(
        &self,
        module: &str,
        owner_id: &str,
        key: &str,
        raw: &str,
        cause: &serde_json::Error,
    ) -> CoreResult<()> {
        match self.config.corruption_policy {
            CorruptionPolicy::Fail => Err(CoreError::CorruptCollection {
                key: key.to_string(),
                message: cause.to_string(),
            }),
            CorruptionPolicy::Quarantine => {
                let target = self.keys.quarantine(module, owner_id)?;
                match self.storage.set(&target, raw) {
                    Ok(()) => {
                        self.storage.remove(key)?;
                        warn!(key, quarantine = %target, error = %cause, "quarantined malformed collection");
                    }
                    Err(e) => {
                        warn!(key, error = %cause, quarantine_error = %e, "malformed collection left in place");
                    }
                }
                self.cache.invalidate(key);
                Ok(())
            }
        }
    }
}

impl<S: KeyValueStorage> std::fmt::Debug for RecordStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// A [`RecordStore`] view bound to one owner.
pub struct OwnerScope<'a, S: KeyValueStorage> {
    store: &'a RecordStore<S>,
    owner_id: String,
}

impl<S: KeyValueStorage> OwnerScope<'_, S> {
    /// Returns the bound owner id.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// See [`RecordStore::load`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn load(&self, module: &str) -> CoreResult<Vec<Record>> {
        self.store.load(module, &self.owner_id)
    }

    /// See [`RecordStore::get_by_id`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn get_by_id(&self, module: &str, id: &str) -> CoreResult<Option<Record>> {
        self.store.get_by_id(module, &self.owner_id, id)
    }

    /// See [`RecordStore::create`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::save`].
    pub fn create(&self, module: &str, partial: Fields) -> CoreResult<Record> {
        self.store.create(module, &self.owner_id, partial)
    }

    /// See [`RecordStore::update`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::update`].
    pub fn update(&self, module: &str, id: &str, patch: &Fields) -> CoreResult<Record> {
        self.store.update(module, &self.owner_id, id, patch)
    }

    /// See [`RecordStore::delete`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::delete`].
    pub fn delete(&self, module: &str, id: &str) -> CoreResult<Record> {
        self.store.delete(module, &self.owner_id, id)
    }

    /// See [`RecordStore::bulk`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::save`].
    pub fn bulk(&self, module: &str, request: &BulkRequest) -> CoreResult<BulkOutcome> {
        self.store.bulk(module, &self.owner_id, request)
    }

    /// See [`RecordStore::query`].
    ///
    /// # Errors
    ///
    /// See [`RecordStore::load`].
    pub fn query(&self, module: &str, query: &Query) -> CoreResult<QueryPage> {
        self.store.query(module, &self.owner_id, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::SessionIdentity;
    use deskstore_storage::{InMemoryStorage, StorageResult};
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Harness {
        store: RecordStore<InMemoryStorage>,
        storage: Arc<InMemoryStorage>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(storage: InMemoryStorage, config: StoreConfig) -> Harness {
        let storage = Arc::new(storage);
        let clock = Arc::new(ManualClock::at_epoch_millis(1_760_000_000_000));
        let ids = IdGenerator::seeded(clock.clone(), 1);
        let store = RecordStore::with_parts(storage.clone(), config, clock.clone(), ids);
        Harness {
            store,
            storage,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(InMemoryStorage::new(), StoreConfig::default())
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn load_missing_returns_default_without_writing() {
        let h = harness();
        let default = vec![Record::new("seed", "u1")];

        let loaded = h.store.load_or("todos", "u1", default.clone()).unwrap();
        assert_eq!(loaded, default);
        assert!(h.storage.get("deskstore_todos_u1").unwrap().is_none());
    }

    #[test]
    fn load_twice_is_idempotent_and_second_hits_cache() {
        let h = harness();
        h.store.create("todos", "u1", fields(json!({"title": "A"}))).unwrap();

        let first = h.store.load_detailed("todos", "u1").unwrap();
        let second = h.store.load_detailed("todos", "u1").unwrap();
        assert_eq!(first.source, LoadSource::Storage);
        assert_eq!(second.source, LoadSource::Cache);
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn cache_hit_does_not_touch_storage() {
        let h = harness();
        h.store.create("todos", "u1", fields(json!({"title": "A"}))).unwrap();
        h.store.load("todos", "u1").unwrap();

        // Change storage behind the store's back: the cached snapshot wins
        h.storage.set("deskstore_todos_u1", "[]").unwrap();
        assert_eq!(h.store.load("todos", "u1").unwrap().len(), 1);

        // Once the TTL passes, storage is read again
        h.clock.advance(Duration::from_secs(5 * 60));
        assert!(h.store.load("todos", "u1").unwrap().is_empty());
    }

    #[test]
    fn save_invalidates_cache() {
        let h = harness();
        h.store.load("todos", "u1").unwrap();
        h.store
            .save("todos", "u1", vec![Record::new("x", "u1")])
            .unwrap();

        let outcome = h.store.load_detailed("todos", "u1").unwrap();
        assert_eq!(outcome.source, LoadSource::Storage);
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn save_stamps_and_marks_local() {
        let h = harness();
        let mut synced = Record::new("b", "u1");
        synced.updated_at = Some("2020-01-01T00:00:00.000Z".into());
        synced.sync_status = SyncStatus::Synced;

        let saved = h
            .store
            .save("todos", "u1", vec![Record::new("a", ""), synced])
            .unwrap();

        assert_eq!(saved[0].updated_at.as_deref(), Some("2025-10-09T08:53:20.000Z"));
        assert_eq!(saved[0].owner_id, "u1");
        assert_eq!(saved[1].updated_at.as_deref(), Some("2020-01-01T00:00:00.000Z"));
        assert!(saved.iter().all(|r| r.sync_status == SyncStatus::Local));
        assert!(h.store.ledger().contains("todos", "u1").unwrap());
    }

    #[test]
    fn save_rejects_duplicate_ids() {
        let h = harness();
        let result = h.store.save(
            "todos",
            "u1",
            vec![Record::new("a", "u1"), Record::new("a", "u1")],
        );
        assert!(matches!(result, Err(CoreError::DuplicateId { .. })));
        assert!(h.storage.get("deskstore_todos_u1").unwrap().is_none());
    }

    #[test]
    fn save_reports_quota_failure() {
        let h = harness_with(InMemoryStorage::with_quota(64), StoreConfig::default());
        let big = Record::new("a", "u1").with_field("body", "x".repeat(200));

        let err = h.store.save("todos", "u1", vec![big]).unwrap_err();
        assert!(err.is_quota_exceeded());
        assert!(!h.store.ledger().contains("todos", "u1").unwrap());
    }

    #[test]
    fn create_then_get_by_id() {
        let h = harness();
        let created = h
            .store
            .create("todos", "u1", fields(json!({"title": "A", "id": "ignored"})))
            .unwrap();

        assert_ne!(created.id, "ignored");
        assert_eq!(created.owner_id, "u1");
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(created.fields.get("title"), Some(&json!("A")));

        let fetched = h.store.get_by_id("todos", "u1", &created.id).unwrap();
        assert_eq!(fetched, Some(created));
    }

    #[test]
    fn get_by_id_absent_is_none() {
        let h = harness();
        assert_eq!(h.store.get_by_id("todos", "u1", "nope").unwrap(), None);
    }

    #[test]
    fn same_millisecond_creates_get_distinct_ids() {
        let h = harness();
        let a = h.store.create("todos", "u1", Fields::new()).unwrap();
        let b = h.store.create("todos", "u1", Fields::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(h.store.load("todos", "u1").unwrap().len(), 2);
    }

    #[test]
    fn update_merges_and_restamps() {
        let h = harness();
        let created = h
            .store
            .create("todos", "u1", fields(json!({"title": "A", "done": false})))
            .unwrap();

        // Same millisecond: the stamp still moves forward
        let updated = h
            .store
            .update("todos", "u1", &created.id, &fields(json!({"title": "B"})))
            .unwrap();

        assert_eq!(updated.fields.get("title"), Some(&json!("B")));
        assert_eq!(updated.fields.get("done"), Some(&json!(false)));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[test]
    fn update_missing_is_not_found() {
        let h = harness();
        let err = h
            .store
            .update("todos", "u1", "ghost", &Fields::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_removes_exactly_one() {
        let h = harness();
        let a = h.store.create("todos", "u1", Fields::new()).unwrap();
        h.store.create("todos", "u1", Fields::new()).unwrap();

        let removed = h.store.delete("todos", "u1", &a.id).unwrap();
        assert_eq!(removed.id, a.id);
        assert_eq!(h.store.load("todos", "u1").unwrap().len(), 1);
        assert_eq!(h.store.get_by_id("todos", "u1", &a.id).unwrap(), None);
    }

    #[test]
    fn delete_missing_does_not_write() {
        let h = harness();
        let err = h.store.delete("todos", "u1", "ghost").unwrap_err();
        assert!(err.is_not_found());
        assert!(h.storage.get("deskstore_todos_u1").unwrap().is_none());
        assert!(!h.store.ledger().contains("todos", "u1").unwrap());
    }

    #[test]
    fn bulk_update_and_archive() {
        let h = harness();
        let a = h.store.create("todos", "u1", Fields::new()).unwrap();
        let b = h.store.create("todos", "u1", Fields::new()).unwrap();
        let c = h.store.create("todos", "u1", Fields::new()).unwrap();

        let outcome = h
            .store
            .bulk(
                "todos",
                "u1",
                &BulkRequest::update([&a.id, &b.id, "ghost"], fields(json!({"done": true}))),
            )
            .unwrap();
        assert_eq!(outcome.affected, 2);

        let outcome = h
            .store
            .bulk("todos", "u1", &BulkRequest::archive([&c.id]))
            .unwrap();
        assert_eq!(outcome.affected, 1);

        let c = h.store.get_by_id("todos", "u1", &c.id).unwrap().unwrap();
        assert_eq!(c.fields.get("archived"), Some(&json!(true)));
        assert_eq!(c.fields.get("archivedAt").cloned(), c.updated_at.clone().map(Value::String));

        let done = h
            .store
            .query("todos", "u1", &Query::new().filter("done", true))
            .unwrap();
        assert_eq!(done.total, 2);
    }

    #[test]
    fn bulk_delete_is_one_write() {
        let h = harness();
        let a = h.store.create("todos", "u1", Fields::new()).unwrap();
        let b = h.store.create("todos", "u1", Fields::new()).unwrap();
        h.store.create("todos", "u1", Fields::new()).unwrap();

        let outcome = h
            .store
            .bulk("todos", "u1", &BulkRequest::delete([&a.id, &b.id]))
            .unwrap();
        assert_eq!(outcome.affected, 2);
        assert_eq!(h.store.load("todos", "u1").unwrap().len(), 1);
    }

    #[test]
    fn bulk_with_no_matches_writes_nothing() {
        let h = harness();
        let outcome = h
            .store
            .bulk("todos", "u1", &BulkRequest::delete(["ghost"]))
            .unwrap();
        assert_eq!(outcome.affected, 0);
        assert!(h.storage.get("deskstore_todos_u1").unwrap().is_none());
    }

    #[test]
    fn bulk_failure_applies_nothing() {
        let h = harness_with(InMemoryStorage::with_quota(600), StoreConfig::default());
        let a = h.store.create("todos", "u1", Fields::new()).unwrap();
        let before = h.storage.get("deskstore_todos_u1").unwrap();

        let err = h
            .store
            .bulk(
                "todos",
                "u1",
                &BulkRequest::update([&a.id], fields(json!({"body": "x".repeat(1000)}))),
            )
            .unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(h.storage.get("deskstore_todos_u1").unwrap(), before);
        assert!(h.store.get_by_id("todos", "u1", &a.id).unwrap().unwrap().fields.is_empty());
    }

    #[test]
    fn query_does_not_touch_ledger() {
        let h = harness();
        h.storage
            .set("deskstore_todos_u1", r#"[{"id":"a","title":"x"}]"#)
            .unwrap();

        let page = h.store.query("todos", "u1", &Query::new().search("X")).unwrap();
        assert_eq!(page.total, 1);
        assert!(h.store.ledger().entries().unwrap().is_empty());
    }

    #[test]
    fn corrupt_collection_is_quarantined() {
        let h = harness_with(
            InMemoryStorage::with_entries([("deskstore_todos_u1", "not json")]),
            StoreConfig::default(),
        );

        let outcome = h.store.load_detailed("todos", "u1").unwrap();
        assert_eq!(outcome.source, LoadSource::Quarantined);
        assert!(outcome.records.is_empty());
        assert_eq!(
            h.storage.get("deskstore_quarantine_todos_u1").unwrap().as_deref(),
            Some("not json")
        );

        // The bad value is gone, so the next load sees "no data"
        let outcome = h.store.load_detailed("todos", "u1").unwrap();
        assert_eq!(outcome.source, LoadSource::Missing);
    }

    #[test]
    fn corrupt_collection_fails_under_fail_policy() {
        let h = harness_with(
            InMemoryStorage::with_entries([("deskstore_todos_u1", "[{\"id\": ")]),
            StoreConfig::default().corruption_policy(CorruptionPolicy::Fail),
        );

        let err = h.store.load("todos", "u1").unwrap_err();
        assert!(matches!(err, CoreError::CorruptCollection { .. }));
        assert!(h.storage.get("deskstore_todos_u1").unwrap().is_some());
    }

    #[test]
    fn quarantine_leaves_lookalike_owner_alone() {
        let h = harness_with(
            InMemoryStorage::with_entries([("deskstore_todos_u1", "{{{")]),
            StoreConfig::default(),
        );
        let neighbour = h.store.create("todos", "u1.corrupt", Fields::new()).unwrap();

        assert!(h.store.load("todos", "u1").unwrap().is_empty());
        assert_eq!(
            h.store.load("todos", "u1.corrupt").unwrap(),
            vec![neighbour]
        );
    }

    #[test]
    fn foreign_json_is_left_in_place() {
        for policy in [CorruptionPolicy::Quarantine, CorruptionPolicy::Fail] {
            let h = harness_with(
                InMemoryStorage::new(),
                StoreConfig::default().corruption_policy(policy),
            );
            let settings = json!({"theme": "dark"});
            h.store.write_raw("settings", "u1", &settings).unwrap();

            let outcome = h.store.load_detailed("settings", "u1").unwrap();
            assert_eq!(outcome.source, LoadSource::Unrecognized);
            assert!(outcome.records.is_empty());
            assert_eq!(h.store.query("settings", "u1", &Query::new()).unwrap().total, 0);

            // Mutations refuse to replace the payload with a record list
            let err = h.store.create("settings", "u1", Fields::new()).unwrap_err();
            assert!(matches!(err, CoreError::NotACollection { .. }));

            assert_eq!(h.store.read_raw("settings", "u1").unwrap(), Some(settings));
            assert!(h.storage.get("deskstore_quarantine_settings_u1").unwrap().is_none());
            assert!(h.store.ledger().contains("settings", "u1").unwrap());
        }
    }

    #[test]
    fn settle_pending_clears_only_an_unchanged_payload() {
        let h = harness();
        let pushed = json!({"theme": "dark"});
        h.store.write_raw("settings", "u1", &pushed).unwrap();

        h.store.write_raw("settings", "u1", &json!({"theme": "light"})).unwrap();
        assert!(!h.store.settle_pending("settings", "u1", Some(&pushed)).unwrap());
        assert!(h.store.ledger().contains("settings", "u1").unwrap());

        let current = h.store.read_raw("settings", "u1").unwrap();
        assert!(h.store.settle_pending("settings", "u1", current.as_ref()).unwrap());
        assert!(!h.store.ledger().contains("settings", "u1").unwrap());

        // A pair whose data vanished settles only while it stays absent
        h.store.write_raw("todos", "u1", &json!([])).unwrap();
        assert!(!h.store.settle_pending("todos", "u1", None).unwrap());
        h.store.remove_raw("todos", "u1").unwrap();
        assert!(h.store.settle_pending("todos", "u1", None).unwrap());
        assert!(h.store.ledger().entries().unwrap().is_empty());
    }

    #[test]
    fn raw_primitives_share_the_key_layout() {
        let h = harness();
        let payload = json!([{"id": "r1", "title": "from remote"}]);

        h.store.mirror_raw("todos", "u1", &payload).unwrap();
        assert!(!h.store.ledger().contains("todos", "u1").unwrap());
        assert_eq!(h.store.load("todos", "u1").unwrap()[0].id, "r1");

        h.store.write_raw("settings", "u1", &json!({"theme": "dark"})).unwrap();
        assert!(h.store.ledger().contains("settings", "u1").unwrap());
        assert_eq!(
            h.store.read_raw("settings", "u1").unwrap(),
            Some(json!({"theme": "dark"}))
        );

        assert!(h.store.remove_raw("settings", "u1").unwrap());
        assert!(!h.store.remove_raw("settings", "u1").unwrap());
        assert_eq!(h.store.read_raw("settings", "u1").unwrap(), None);
    }

    #[test]
    fn clear_owner_wipes_only_that_owner() {
        let h = harness();
        h.store.create("todos", "u1", Fields::new()).unwrap();
        h.store.create("groups", "u1", Fields::new()).unwrap();
        h.store.create("todos", "u2", Fields::new()).unwrap();

        assert_eq!(h.store.clear_owner("u1").unwrap(), 2);
        assert!(h.store.load("todos", "u1").unwrap().is_empty());
        assert_eq!(h.store.load("todos", "u2").unwrap().len(), 1);
        assert!(!h.store.ledger().contains("todos", "u1").unwrap());
        assert!(h.store.ledger().contains("todos", "u2").unwrap());
    }

    #[test]
    fn owner_usage_counts_records() {
        let h = harness();
        h.store.create("todos", "u1", Fields::new()).unwrap();
        h.store.create("todos", "u1", Fields::new()).unwrap();

        let usage = h.store.owner_usage("u1").unwrap();
        assert_eq!(usage.modules.len(), 1);
        assert_eq!(usage.modules[0].module, "todos");
        assert_eq!(usage.modules[0].records, 2);
        assert!(usage.total_bytes > 0);

        // The whole storage also holds the ledger
        assert!(usage.storage_bytes > usage.total_bytes);
        assert_eq!(usage.storage_bytes, h.storage.usage_bytes().unwrap());
    }

    #[test]
    fn scoped_store_uses_signed_in_owner() {
        let h = harness();
        let session = SessionIdentity::new();
        assert!(matches!(
            h.store.scoped(&session),
            Err(CoreError::NotSignedIn)
        ));

        session.login("u9");
        let scope = h.store.scoped(&session).unwrap();
        let created = scope.create("todos", fields(json!({"title": "mine"}))).unwrap();
        assert_eq!(created.owner_id, "u9");
        assert_eq!(h.store.load("todos", "u9").unwrap().len(), 1);
    }

    #[test]
    fn concurrent_creates_are_not_lost() {
        let h = harness();
        let store = Arc::new(h.store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store.create("todos", "u1", Fields::new()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load("todos", "u1").unwrap().len(), 80);
    }

    /// Storage whose next `get` pauses after reading until released.
    struct GatedStorage {
        inner: InMemoryStorage,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl GatedStorage {
        fn new() -> Self {
            Self {
                inner: InMemoryStorage::new(),
                gate: Mutex::new(None),
            }
        }

        fn pause_next_get(&self, reached: mpsc::Sender<()>, resume: mpsc::Receiver<()>) {
            *self.gate.lock() = Some((reached, resume));
        }
    }

    impl KeyValueStorage for GatedStorage {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            let value = self.inner.get(key)?;
            let gate = self.gate.lock().take();
            if let Some((reached, resume)) = gate {
                reached.send(()).unwrap();
                resume.recv().unwrap();
            }
            Ok(value)
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> StorageResult<Vec<String>> {
            self.inner.keys()
        }

        fn usage_bytes(&self) -> StorageResult<u64> {
            self.inner.usage_bytes()
        }
    }

    #[test]
    fn load_racing_a_write_does_not_cache_stale_snapshot() {
        let storage = Arc::new(GatedStorage::new());
        let clock = Arc::new(ManualClock::at_epoch_millis(1_760_000_000_000));
        let ids = IdGenerator::seeded(clock.clone(), 1);
        let store = Arc::new(RecordStore::with_parts(
            storage.clone(),
            StoreConfig::default(),
            clock,
            ids,
        ));
        store.create("todos", "u1", Fields::new()).unwrap();

        let (reached_tx, reached_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        storage.pause_next_get(reached_tx, resume_rx);

        let reader = {
            let store = store.clone();
            std::thread::spawn(move || store.load("todos", "u1").unwrap().len())
        };

        // The reader holds a one-record snapshot; a second record lands
        reached_rx.recv().unwrap();
        store.create("todos", "u1", Fields::new()).unwrap();
        resume_tx.send(()).unwrap();
        assert_eq!(reader.join().unwrap(), 1);

        store.create("todos", "u1", Fields::new()).unwrap();
        assert_eq!(store.load("todos", "u1").unwrap().len(), 3);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");

        let created = {
            let storage = deskstore_storage::FileStorage::open(&path).unwrap();
            let store = RecordStore::open(storage, StoreConfig::default());
            let record = store.create("receipts", "u1", fields(json!({"total": 12.5}))).unwrap();
            store.write_raw("settings", "u1", &json!({"currency": "EUR"})).unwrap();
            record
        };

        let storage = deskstore_storage::FileStorage::open(&path).unwrap();
        let store = RecordStore::open(storage, StoreConfig::default());
        assert_eq!(store.get_by_id("receipts", "u1", &created.id).unwrap(), Some(created));
        assert_eq!(
            store.read_raw("settings", "u1").unwrap(),
            Some(json!({"currency": "EUR"}))
        );
        assert_eq!(store.ledger().entries().unwrap().len(), 2);
    }
}
