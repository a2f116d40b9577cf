//! # DeskStore Core
//!
//! Owner- and module-scoped record store for DeskStore.
//!
//! This crate provides:
//! - CRUD over per-(module, owner) record collections
//! - Read-through collection cache with a TTL
//! - Collision-free id generation
//! - Search, filter, sort and pagination over a collection
//! - Batch mutation with a single write per batch
//! - The pending-sync ledger
//! - Owner export and import
//!
//! ## Key Layout
//!
//! ```text
//! <prefix>_<module>_<ownerId>   -> JSON array of records
//! <prefix>_pending_sync         -> JSON array of "<module>_<ownerId>"
//! <prefix>_quarantine_<module>_<ownerId>
//!                               -> unparseable value moved aside
//! ```
//!
//! ## Key Invariants
//!
//! - Every write replaces the whole collection
//! - Ids are unique within a collection and never reassigned
//! - `updatedAt` strictly increases on every mutation
//! - A write drops the cache entry before returning, so the next load
//!   observes it; a load that raced the write never caches what it read
//! - Only unparseable text is quarantined; valid JSON of another shape is
//!   left where it is
//! - Failures are returned, never thrown past the public API
//!
//! ## Example
//!
//! ```rust
//! use deskstore_core::{RecordStore, StoreConfig};
//! use deskstore_storage::InMemoryStorage;
//! use serde_json::json;
//!
//! let store = RecordStore::open(InMemoryStorage::new(), StoreConfig::default());
//! let payload = json!({"title": "Ship it"}).as_object().cloned().unwrap();
//! let todo = store.create("todos", "u1", payload).unwrap();
//! assert_eq!(store.get_by_id("todos", "u1", &todo.id).unwrap(), Some(todo));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod cache;
mod clock;
mod config;
mod error;
mod id;
mod identity;
mod keys;
mod ledger;
mod query;
mod snapshot;
mod store;
mod types;

pub use bulk::{BulkAction, BulkOutcome, BulkRequest};
pub use cache::{CacheTicket, CollectionCache};
pub use clock::{format_timestamp, parse_timestamp, Clock, ManualClock, SystemClock};
pub use config::{
    CorruptionPolicy, StoreConfig, DEFAULT_CACHE_TTL, DEFAULT_KEY_PREFIX, DEFAULT_MODULES,
};
pub use error::{CoreError, CoreResult};
pub use id::IdGenerator;
pub use identity::{IdentityProvider, SessionIdentity};
pub use keys::{validate_module, validate_owner, KeyLayout};
pub use ledger::{LedgerEntry, PendingSyncLedger};
pub use query::{Query, QueryPage, SortOrder};
pub use snapshot::{ImportOutcome, Snapshot, SNAPSHOT_VERSION};
pub use store::{LoadOutcome, LoadSource, ModuleUsage, OwnerScope, OwnerUsage, RecordStore};
pub use types::{Fields, Record, SyncStatus, RESERVED_FIELDS};
