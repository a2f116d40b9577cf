//! Remote store abstraction.

use crate::error::RemoteResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the remote `user_data` table.
///
/// Rows are unique per (`owner_id`, `module`); the payload is the whole
/// module value, exactly as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataRow {
    /// Owning user.
    pub owner_id: String,
    /// Module name.
    pub module: String,
    /// Module payload.
    pub data: Value,
    /// Last write time, ISO-8601.
    pub updated_at: String,
}

impl UserDataRow {
    /// Creates a row.
    pub fn new(
        owner_id: impl Into<String>,
        module: impl Into<String>,
        data: Value,
        updated_at: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            module: module.into(),
            data,
            updated_at: updated_at.into(),
        }
    }
}

/// A remote table-oriented store holding one row per (owner, module).
///
/// This trait abstracts the hosted backend, allowing for different
/// implementations (HTTP, in-memory for testing, etc.).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts or replaces the row for (`row.owner_id`, `row.module`).
    /// Returns the row as stored.
    async fn upsert(&self, row: UserDataRow) -> RemoteResult<UserDataRow>;

    /// Fetches the row for (owner, module). `Ok(None)` means no such row.
    async fn select(&self, owner_id: &str, module: &str) -> RemoteResult<Option<UserDataRow>>;

    /// Deletes the row for (owner, module). Deleting a missing row succeeds.
    async fn delete(&self, owner_id: &str, module: &str) -> RemoteResult<()>;

    /// Deletes every row of `owner_id`. Returns how many were deleted.
    async fn delete_all_for_owner(&self, owner_id: &str) -> RemoteResult<u64>;

    /// Counts all rows. Used as a cheap reachability probe.
    async fn count_rows(&self) -> RemoteResult<u64>;
}
