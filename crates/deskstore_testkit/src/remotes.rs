//! Remote stores with scripted failures.

use async_trait::async_trait;
use deskstore_sync::{MemoryRemote, RemoteError, RemoteResult, RemoteStore, UserDataRow};
use std::sync::atomic::{AtomicU32, Ordering};

/// An in-memory remote that fails a scripted number of requests.
///
/// While failures remain, every request returns the configured error
/// without reaching the underlying table.
#[derive(Debug)]
pub struct FlakyRemote {
    inner: MemoryRemote,
    remaining_failures: AtomicU32,
    error: RemoteError,
}

impl FlakyRemote {
    /// Creates a remote failing with a retryable transport error.
    pub fn new() -> Self {
        Self::with_error(RemoteError::transport_retryable("connection reset"))
    }

    /// Creates a remote failing with `error`.
    pub fn with_error(error: RemoteError) -> Self {
        Self {
            inner: MemoryRemote::new(),
            remaining_failures: AtomicU32::new(0),
            error,
        }
    }

    /// Makes the next `count` requests fail.
    pub fn fail_next(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Returns how many scripted failures are left.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::SeqCst)
    }

    /// Returns the underlying table.
    pub fn inner(&self) -> &MemoryRemote {
        &self.inner
    }

    fn trip(&self) -> RemoteResult<()> {
        let tripped = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

impl Default for FlakyRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn upsert(&self, row: UserDataRow) -> RemoteResult<UserDataRow> {
        self.trip()?;
        self.inner.upsert(row).await
    }

    async fn select(&self, owner_id: &str, module: &str) -> RemoteResult<Option<UserDataRow>> {
        self.trip()?;
        self.inner.select(owner_id, module).await
    }

    async fn delete(&self, owner_id: &str, module: &str) -> RemoteResult<()> {
        self.trip()?;
        self.inner.delete(owner_id, module).await
    }

    async fn delete_all_for_owner(&self, owner_id: &str) -> RemoteResult<u64> {
        self.trip()?;
        self.inner.delete_all_for_owner(owner_id).await
    }

    async fn count_rows(&self) -> RemoteResult<u64> {
        self.trip()?;
        self.inner.count_rows().await
    }
}
