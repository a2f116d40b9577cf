//! In-memory remote store.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{RemoteStore, UserDataRow};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A remote store kept in process memory.
///
/// Behaves like a hosted `user_data` table with a unique
/// (owner, module) constraint. It can be switched offline to exercise
/// fallback paths.
#[derive(Debug)]
pub struct MemoryRemote {
    rows: RwLock<BTreeMap<(String, String), UserDataRow>>,
    online: AtomicBool,
    requests: AtomicU64,
}

impl MemoryRemote {
    /// Creates an empty, online remote.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            online: AtomicBool::new(true),
            requests: AtomicU64::new(0),
        }
    }

    /// Sets whether the remote is reachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true if the remote is reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns the stored row for (owner, module), bypassing availability.
    pub fn row(&self, owner_id: &str, module: &str) -> Option<UserDataRow> {
        self.rows
            .read()
            .get(&(owner_id.to_string(), module.to_string()))
            .cloned()
    }

    /// Returns the number of stored rows, bypassing availability.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of requests received, including those refused while offline.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> RemoteResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.is_online() {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("remote store is offline".into()))
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn upsert(&self, row: UserDataRow) -> RemoteResult<UserDataRow> {
        self.check_online()?;
        if row.owner_id.is_empty() || row.module.is_empty() {
            return Err(RemoteError::Rejected(
                "ownerId and module are required".into(),
            ));
        }
        let key = (row.owner_id.clone(), row.module.clone());
        self.rows.write().insert(key, row.clone());
        Ok(row)
    }

    async fn select(&self, owner_id: &str, module: &str) -> RemoteResult<Option<UserDataRow>> {
        self.check_online()?;
        Ok(self.row(owner_id, module))
    }

    async fn delete(&self, owner_id: &str, module: &str) -> RemoteResult<()> {
        self.check_online()?;
        self.rows
            .write()
            .remove(&(owner_id.to_string(), module.to_string()));
        Ok(())
    }

    async fn delete_all_for_owner(&self, owner_id: &str) -> RemoteResult<u64> {
        self.check_online()?;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|(owner, _), _| owner != owner_id);
        Ok((before - rows.len()) as u64)
    }

    async fn count_rows(&self) -> RemoteResult<u64> {
        self.check_online()?;
        Ok(self.rows.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(owner: &str, module: &str, data: serde_json::Value) -> UserDataRow {
        UserDataRow::new(owner, module, data, "2026-01-01T00:00:00.000Z")
    }

    #[tokio::test]
    async fn upsert_replaces_by_owner_and_module() {
        let remote = MemoryRemote::new();
        remote.upsert(row("u1", "todos", json!([1]))).await.unwrap();
        remote.upsert(row("u1", "todos", json!([1, 2]))).await.unwrap();
        remote.upsert(row("u2", "todos", json!([]))).await.unwrap();

        assert_eq!(remote.len(), 2);
        let stored = remote.select("u1", "todos").await.unwrap().unwrap();
        assert_eq!(stored.data, json!([1, 2]));
        assert_eq!(remote.select("u1", "groups").await.unwrap(), None);
    }

    #[tokio::test]
    async fn offline_refuses_everything() {
        let remote = MemoryRemote::new();
        remote.upsert(row("u1", "todos", json!([]))).await.unwrap();
        remote.set_online(false);

        assert!(matches!(
            remote.select("u1", "todos").await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(remote.count_rows().await.unwrap_err().is_retryable());
        // Data survives the outage
        assert!(remote.row("u1", "todos").is_some());
        assert_eq!(remote.requests(), 3);

        remote.set_online(true);
        assert_eq!(remote.count_rows().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_all_for_owner_only_touches_that_owner() {
        let remote = MemoryRemote::new();
        remote.upsert(row("u1", "todos", json!([]))).await.unwrap();
        remote.upsert(row("u1", "settings", json!({}))).await.unwrap();
        remote.upsert(row("u2", "todos", json!([]))).await.unwrap();

        assert_eq!(remote.delete_all_for_owner("u1").await.unwrap(), 2);
        assert_eq!(remote.len(), 1);
        assert!(remote.row("u2", "todos").is_some());

        // Deleting a missing row is not an error
        remote.delete("u1", "todos").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_rows_without_identity() {
        let remote = MemoryRemote::new();
        let err = remote.upsert(row("", "todos", json!([]))).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
        assert!(!err.is_retryable());
    }
}
