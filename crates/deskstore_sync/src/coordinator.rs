//! Dual-write coordinator.

use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::remote::{RemoteStore, UserDataRow};
use crate::report::{ConnectionProbe, ReplayReport, SyncReport, SyncStats};
use deskstore_core::{format_timestamp, validate_module, validate_owner, CoreResult, RecordStore};
use deskstore_storage::KeyValueStorage;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Keeps (owner, module) payloads in the remote store and the local mirror.
///
/// Every write tries the remote first and always leaves the data on this
/// device. A write the remote did not confirm stays marked in the
/// pending-sync ledger until [`SyncCoordinator::replay_pending`] pushes it.
///
/// The coordinator never returns an error for a write: failures are carried
/// in the [`SyncReport`] so callers can keep working on local data.
pub struct SyncCoordinator<R: RemoteStore, S: KeyValueStorage> {
    local: Arc<RecordStore<S>>,
    remote: Option<R>,
    config: SyncConfig,
    stats: RwLock<SyncStats>,
}

impl<R: RemoteStore, S: KeyValueStorage> SyncCoordinator<R, S> {
    /// Creates a coordinator mirroring `local` to `remote`.
    pub fn new(local: Arc<RecordStore<S>>, remote: R, config: SyncConfig) -> Self {
        Self::with_remote(local, Some(remote), config)
    }

    /// Creates a coordinator with no remote configured. Every write is
    /// local-only and stays pending.
    pub fn local_only(local: Arc<RecordStore<S>>, config: SyncConfig) -> Self {
        Self::with_remote(local, None, config)
    }

    /// Creates a coordinator with an optional remote.
    pub fn with_remote(local: Arc<RecordStore<S>>, remote: Option<R>, config: SyncConfig) -> Self {
        Self {
            local,
            remote,
            config,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the local record store.
    pub fn local(&self) -> &Arc<RecordStore<S>> {
        &self.local
    }

    /// Returns the remote store, if one is configured.
    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    /// Returns true if a remote store is configured.
    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns a snapshot of the sync statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Saves `data` as the whole payload of (owner, module).
    ///
    /// On remote success the accepted payload is mirrored locally and the
    /// ledger pair is cleared. On remote failure, or with no remote
    /// configured, the payload is written locally and left pending.
    pub async fn save(&self, owner_id: &str, module: &str, data: Value) -> SyncReport {
        if let Err(e) = check_pair(owner_id, module) {
            return SyncReport::nowhere(e.to_string());
        }
        let Some(remote) = &self.remote else {
            return self.save_locally(owner_id, module, &data, &SyncError::NotConfigured);
        };

        let row = UserDataRow::new(owner_id, module, data.clone(), self.now());
        match remote.upsert(row).await {
            Ok(stored) => {
                self.record_remote_write();
                match self.local.mirror_raw(module, owner_id, &stored.data) {
                    Ok(()) => {
                        self.clear_pending(module, owner_id);
                        debug!(owner_id, module, "payload saved everywhere");
                        SyncReport::everywhere()
                    }
                    Err(e) => {
                        warn!(owner_id, module, error = %e, "remote accepted payload but local mirror failed");
                        self.record_error(&e.to_string());
                        SyncReport::remote_only(format!("local mirror failed: {e}"))
                    }
                }
            }
            Err(e) => self.save_locally(owner_id, module, &data, &SyncError::Remote(e)),
        }
    }

    /// Loads the payload of (owner, module).
    ///
    /// A remote hit is mirrored locally and returned. A remote miss returns
    /// `None` and leaves the mirror alone. A remote failure, or no remote,
    /// falls back to the local mirror.
    pub async fn load(&self, owner_id: &str, module: &str) -> Option<Value> {
        if let Err(e) = check_pair(owner_id, module) {
            warn!(owner_id, module, error = %e, "refusing to load invalid pair");
            return None;
        }

        if let Some(remote) = &self.remote {
            match remote.select(owner_id, module).await {
                Ok(Some(row)) => {
                    self.stats.write().remote_reads += 1;
                    if let Err(e) = self.local.mirror_raw(module, owner_id, &row.data) {
                        warn!(owner_id, module, error = %e, "failed to mirror remote payload");
                    }
                    return Some(row.data);
                }
                Ok(None) => {
                    debug!(owner_id, module, "no remote row");
                    return None;
                }
                Err(e) => {
                    warn!(owner_id, module, error = %e, "remote read failed, using local mirror");
                    self.record_error(&e.to_string());
                }
            }
        }

        self.stats.write().local_reads += 1;
        match self.local.read_raw(module, owner_id) {
            Ok(value) => value,
            Err(e) => {
                warn!(owner_id, module, error = %e, "local mirror unreadable");
                None
            }
        }
    }

    /// Deletes the payload of (owner, module) remotely and locally.
    ///
    /// The local half runs regardless of the remote outcome and is never
    /// rolled back.
    pub async fn delete(&self, owner_id: &str, module: &str) -> SyncReport {
        if let Err(e) = check_pair(owner_id, module) {
            return SyncReport::nowhere(e.to_string());
        }
        let remote_result = match &self.remote {
            Some(remote) => remote.delete(owner_id, module).await.map_err(SyncError::from),
            None => Err(SyncError::NotConfigured),
        };
        let local_result = self
            .local
            .remove_raw(module, owner_id)
            .and_then(|_| self.local.ledger().clear(module, owner_id).map(|_| ()));

        self.dual_outcome(owner_id, module, remote_result, local_result)
    }

    /// Deletes every payload of `owner_id` remotely and locally.
    ///
    /// Locally this removes every registered module collection and the
    /// owner's ledger pairs.
    pub async fn clear_owner(&self, owner_id: &str) -> SyncReport {
        if let Err(e) = validate_owner(owner_id) {
            return SyncReport::nowhere(e.to_string());
        }
        let remote_result = match &self.remote {
            Some(remote) => match remote.delete_all_for_owner(owner_id).await {
                Ok(rows) => {
                    debug!(owner_id, rows, "remote rows deleted");
                    Ok(())
                }
                Err(e) => Err(SyncError::from(e)),
            },
            None => Err(SyncError::NotConfigured),
        };
        let local_result = self.local.clear_owner(owner_id).map(|_| ());

        self.dual_outcome(owner_id, "*", remote_result, local_result)
    }

    /// Probes the remote store with a row count. No retries.
    pub async fn test_connection(&self) -> ConnectionProbe {
        let Some(remote) = &self.remote else {
            return ConnectionProbe {
                ok: false,
                message: SyncError::NotConfigured.to_string(),
            };
        };
        match remote.count_rows().await {
            Ok(rows) => ConnectionProbe {
                ok: true,
                message: format!("connected, {rows} rows"),
            },
            Err(e) => ConnectionProbe {
                ok: false,
                message: e.to_string(),
            },
        }
    }

    /// Pushes every ledger pair's local payload to the remote store.
    ///
    /// Each push is retried with backoff per [`SyncConfig::retry`] while the
    /// error is retryable. A pushed pair is cleared from the ledger only if
    /// its local payload is still the one that was pushed; a pair written
    /// again during the push stays pending and is counted as requeued.
    /// Pairs whose local data is gone are dropped. Failed pairs stay
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConfigured`] without a remote, or a local
    /// error if the ledger cannot be read.
    pub async fn replay_pending(&self) -> SyncResult<ReplayReport> {
        let remote = self.remote.as_ref().ok_or(SyncError::NotConfigured)?;
        let entries = self.local.ledger().entries()?;
        let mut report = ReplayReport::default();

        for entry in entries {
            let data = match self.local.read_raw(&entry.module, &entry.owner_id) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    if self.local.settle_pending(&entry.module, &entry.owner_id, None)? {
                        report.dropped += 1;
                    } else {
                        report.requeued += 1;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(pair = %entry, error = %e, "pending payload unreadable");
                    report.failed.push((entry, e.to_string()));
                    continue;
                }
            };

            let row = UserDataRow::new(&entry.owner_id, &entry.module, data.clone(), self.now());
            match self.upsert_with_retry(remote, row).await {
                Ok(_) => {
                    self.record_remote_write();
                    self.stats.write().replayed += 1;
                    if self
                        .local
                        .settle_pending(&entry.module, &entry.owner_id, Some(&data))?
                    {
                        report.pushed += 1;
                    } else {
                        debug!(pair = %entry, "pair written during replay, stays pending");
                        report.requeued += 1;
                    }
                }
                Err(e) => {
                    warn!(pair = %entry, error = %e, "replay failed, pair stays pending");
                    self.record_error(&e.to_string());
                    report.failed.push((entry, e.to_string()));
                }
            }
        }

        info!(
            pushed = report.pushed,
            requeued = report.requeued,
            dropped = report.dropped,
            failed = report.failed.len(),
            "pending ledger replayed"
        );
        Ok(report)
    }

    async fn upsert_with_retry(&self, remote: &R, row: UserDataRow) -> Result<UserDataRow, RemoteError> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                self.stats.write().retries += 1;
            }
            match remote.upsert(row.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    debug!(attempt, error = %e, "retrying upsert");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn save_locally(&self, owner_id: &str, module: &str, data: &Value, cause: &SyncError) -> SyncReport {
        warn!(owner_id, module, error = %cause, "remote write failed, keeping payload locally");
        {
            let mut stats = self.stats.write();
            stats.local_fallbacks += 1;
            stats.last_error = Some(cause.to_string());
        }
        match self.local.write_raw(module, owner_id, data) {
            Ok(()) => SyncReport::local_only(cause.to_string()),
            Err(e) => {
                error!(owner_id, module, error = %e, "local fallback write failed");
                SyncReport::nowhere(format!("{cause}; local write failed: {e}"))
            }
        }
    }

    fn dual_outcome(
        &self,
        owner_id: &str,
        target: &str,
        remote: SyncResult<()>,
        local: CoreResult<()>,
    ) -> SyncReport {
        match (remote, local) {
            (Ok(()), Ok(())) => SyncReport::everywhere(),
            (Ok(()), Err(local)) => {
                warn!(owner_id, target, error = %local, "local delete failed");
                self.record_error(&local.to_string());
                SyncReport::remote_only(local.to_string())
            }
            (Err(remote), Ok(())) => {
                warn!(owner_id, target, error = %remote, "remote delete failed");
                self.record_error(&remote.to_string());
                SyncReport::local_only(remote.to_string())
            }
            (Err(remote), Err(local)) => {
                error!(owner_id, target, remote_error = %remote, local_error = %local, "delete failed everywhere");
                let message = format!("{remote}; local delete failed: {local}");
                self.record_error(&message);
                SyncReport::nowhere(message)
            }
        }
    }

    fn clear_pending(&self, module: &str, owner_id: &str) {
        if let Err(e) = self.local.ledger().clear(module, owner_id) {
            warn!(owner_id, module, error = %e, "failed to clear pending pair");
        }
    }

    fn record_remote_write(&self) {
        let mut stats = self.stats.write();
        stats.remote_writes += 1;
        stats.last_sync_time = Some(Instant::now());
    }

    fn record_error(&self, message: &str) {
        self.stats.write().last_error = Some(message.to_string());
    }

    fn now(&self) -> String {
        format_timestamp(self.local.clock().now())
    }
}

impl<R: RemoteStore, S: KeyValueStorage> std::fmt::Debug for SyncCoordinator<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("configured", &self.is_configured())
            .field("config", &self.config)
            .field("stats", &*self.stats.read())
            .finish_non_exhaustive()
    }
}

fn check_pair(owner_id: &str, module: &str) -> CoreResult<()> {
    validate_owner(owner_id)?;
    validate_module(module)
}
