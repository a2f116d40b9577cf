//! Outcomes and counters reported by the sync coordinator.

use deskstore_core::LedgerEntry;
use std::time::Instant;

/// Where a write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// Remote and local mirror both hold the data.
    Everywhere,
    /// Only the local mirror holds the data; the ledger pair stays marked.
    LocalOnly,
    /// The remote accepted the data but the local mirror could not be
    /// updated.
    RemoteOnly,
    /// Neither side holds the data.
    Nowhere,
}

/// Result of a dual-target write or delete.
///
/// `success` reflects the remote half: a write that only reached local
/// storage is reported as a failure carrying the remote error, even though
/// the data is safe on this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the remote store accepted the operation.
    pub success: bool,
    /// Description of whatever failed, if anything did.
    pub error: Option<String>,
    /// Where the operation took effect.
    pub scope: WriteScope,
}

impl SyncReport {
    pub(crate) fn everywhere() -> Self {
        Self {
            success: true,
            error: None,
            scope: WriteScope::Everywhere,
        }
    }

    pub(crate) fn local_only(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            scope: WriteScope::LocalOnly,
        }
    }

    pub(crate) fn remote_only(error: impl Into<String>) -> Self {
        Self {
            success: true,
            error: Some(error.into()),
            scope: WriteScope::RemoteOnly,
        }
    }

    pub(crate) fn nowhere(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            scope: WriteScope::Nowhere,
        }
    }

    /// Returns true if both sides hold the data.
    pub fn is_synced(&self) -> bool {
        self.scope == WriteScope::Everywhere
    }

    /// Returns true if the data is at least stored on this device.
    pub fn is_stored_locally(&self) -> bool {
        matches!(self.scope, WriteScope::Everywhere | WriteScope::LocalOnly)
    }
}

/// Result of a reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProbe {
    /// Whether the remote answered.
    pub ok: bool,
    /// Human-readable detail.
    pub message: String,
}

/// Result of replaying the pending-sync ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Pairs pushed to the remote and cleared from the ledger.
    pub pushed: usize,
    /// Pairs written locally again while being replayed. They stay pending
    /// for the next replay.
    pub requeued: usize,
    /// Pairs with no local data left, cleared without pushing.
    pub dropped: usize,
    /// Pairs still pending, with the last error for each.
    pub failed: Vec<(LedgerEntry, String)>,
}

impl ReplayReport {
    /// Returns true if nothing is left pending.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.requeued == 0
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Writes the remote accepted, replays included.
    pub remote_writes: u64,
    /// Writes that fell back to local storage only.
    pub local_fallbacks: u64,
    /// Reads answered by the remote.
    pub remote_reads: u64,
    /// Reads answered by the local mirror.
    pub local_reads: u64,
    /// Ledger pairs pushed by replay.
    pub replayed: u64,
    /// Total number of retries during replay.
    pub retries: u64,
    /// Last time the remote accepted a write.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_scopes() {
        let full = SyncReport::everywhere();
        assert!(full.success && full.is_synced() && full.is_stored_locally());

        let local = SyncReport::local_only("offline");
        assert!(!local.success);
        assert!(local.is_stored_locally());
        assert_eq!(local.error.as_deref(), Some("offline"));

        let remote = SyncReport::remote_only("quota");
        assert!(remote.success);
        assert!(!remote.is_stored_locally());

        let none = SyncReport::nowhere("everything broke");
        assert!(!none.success && !none.is_stored_locally());
    }

    #[test]
    fn replay_completion() {
        let mut report = ReplayReport::default();
        assert!(report.is_complete());
        report
            .failed
            .push((LedgerEntry::new("todos", "u1"), "offline".into()));
        assert!(!report.is_complete());

        let requeued = ReplayReport {
            pushed: 1,
            requeued: 1,
            ..ReplayReport::default()
        };
        assert!(!requeued.is_complete());
    }
}
