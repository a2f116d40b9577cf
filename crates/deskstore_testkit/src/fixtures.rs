//! Test fixtures and store helpers.
//!
//! Provides record stores with a frozen clock and deterministic ids so tests
//! can assert on exact timestamps.

use deskstore_core::{Fields, IdGenerator, ManualClock, RecordStore, StoreConfig};
use deskstore_storage::{FileStorage, InMemoryStorage, KeyValueStorage};
use deskstore_sync::{MemoryRemote, SyncConfig, SyncCoordinator};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Epoch milliseconds every fixture clock starts at.
pub const FIXTURE_EPOCH_MILLIS: i64 = 1_760_000_000_000;

/// [`FIXTURE_EPOCH_MILLIS`] as an ISO-8601 timestamp.
pub const FIXTURE_EPOCH: &str = "2025-10-09T08:53:20.000Z";

/// A record store with a manual clock and automatic cleanup.
pub struct TestStore<S: KeyValueStorage> {
    /// The store, shareable with a coordinator.
    pub store: Arc<RecordStore<S>>,
    /// The clock driving timestamps and cache expiry.
    pub clock: Arc<ManualClock>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore<InMemoryStorage> {
    /// Creates an in-memory store with the default configuration.
    pub fn memory() -> Self {
        Self::memory_with(InMemoryStorage::new(), StoreConfig::default())
    }

    /// Creates a store over the given in-memory storage.
    pub fn memory_with(storage: InMemoryStorage, config: StoreConfig) -> Self {
        Self::build(Arc::new(storage), config, None)
    }
}

impl TestStore<FileStorage> {
    /// Creates a file-backed store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage =
            FileStorage::open(&temp_dir.path().join("store")).expect("Failed to open file storage");
        Self::build(Arc::new(storage), StoreConfig::default(), Some(temp_dir))
    }
}

impl<S: KeyValueStorage> TestStore<S> {
    fn build(storage: Arc<S>, config: StoreConfig, temp_dir: Option<TempDir>) -> Self {
        let clock = Arc::new(ManualClock::at_epoch_millis(FIXTURE_EPOCH_MILLIS));
        let store = RecordStore::with_parts(
            storage,
            config,
            clock.clone(),
            IdGenerator::seeded(clock.clone(), 42),
        );
        Self {
            store: Arc::new(store),
            clock,
            _temp_dir: temp_dir,
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Creates a coordinator over this store and a fresh in-memory remote.
    pub fn coordinator(&self, config: SyncConfig) -> SyncCoordinator<MemoryRemote, S> {
        SyncCoordinator::new(self.store.clone(), MemoryRemote::new(), config)
    }
}

impl<S: KeyValueStorage> std::ops::Deref for TestStore<S> {
    type Target = RecordStore<S>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&RecordStore<InMemoryStorage>) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// Builds a payload from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
