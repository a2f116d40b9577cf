//! Read-through collection cache with time-based invalidation.

use crate::clock::Clock;
use crate::types::Record;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct CacheEntry {
    records: Vec<Record>,
    captured_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    // Bumped by `invalidate`; a read that started before the bump must not
    // populate the key.
    generations: HashMap<String, u64>,
    // Bumped by `clear`.
    epoch: u64,
}

impl CacheState {
    fn ticket(&self, key: &str) -> CacheTicket {
        CacheTicket {
            epoch: self.epoch,
            generation: self.generations.get(key).copied().unwrap_or(0),
        }
    }
}

/// Marks the cache state a storage read started from.
///
/// Taken before reading storage and handed back to
/// [`CollectionCache::put_if_current`], which refuses the snapshot if the
/// key was invalidated in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket {
    epoch: u64,
    generation: u64,
}

/// Snapshot cache keyed by collection key.
///
/// An entry is valid only while `0 <= now - captured_at < ttl`; expired
/// entries behave exactly like absent ones and are dropped when looked up.
pub struct CollectionCache {
    state: RwLock<CacheState>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CollectionCache {
    /// Creates an empty cache.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
            clock,
        }
    }

    /// Returns the entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the cached snapshot if it is still valid.
    pub fn get(&self, key: &str) -> Option<Vec<Record>> {
        let now = self.clock.now();
        {
            let state = self.state.read();
            match state.entries.get(key) {
                None => return None,
                Some(entry) if self.is_fresh(entry, now) => return Some(entry.records.clone()),
                Some(_) => {}
            }
        }
        self.state.write().entries.remove(key);
        None
    }

    /// Returns a ticket for a storage read of `key` that is about to start.
    pub fn ticket(&self, key: &str) -> CacheTicket {
        self.state.read().ticket(key)
    }

    /// Stores a snapshot captured now.
    pub fn put(&self, key: &str, records: Vec<Record>) {
        let entry = CacheEntry {
            records,
            captured_at: self.clock.now(),
        };
        self.state.write().entries.insert(key.to_string(), entry);
    }

    /// Stores a snapshot read under `ticket`, unless `key` was invalidated
    /// or the cache cleared since the ticket was taken. Returns true if the
    /// snapshot was stored.
    pub fn put_if_current(&self, key: &str, records: Vec<Record>, ticket: CacheTicket) -> bool {
        let mut state = self.state.write();
        if state.ticket(key) != ticket {
            return false;
        }
        let entry = CacheEntry {
            records,
            captured_at: self.clock.now(),
        };
        state.entries.insert(key.to_string(), entry);
        true
    }

    /// Drops the entry for `key` and voids outstanding tickets for it.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.state.write();
        state.entries.remove(key);
        *state.generations.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Drops every entry and voids every outstanding ticket.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.epoch += 1;
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        // A negative age means the clock moved backwards; the entry's age
        // is unknown, so it is treated as expired.
        (now - entry.captured_at)
            .to_std()
            .is_ok_and(|age| age < self.ttl)
    }
}

impl std::fmt::Debug for CollectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
