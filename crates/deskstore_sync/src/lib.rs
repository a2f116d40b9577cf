//! # DeskStore Sync
//!
//! Best-effort remote mirroring for DeskStore.
//!
//! This crate provides:
//! - The `RemoteStore` abstraction over a `user_data(ownerId, module, data,
//!   updatedAt)` table
//! - A dual-write coordinator with local fallback
//! - Replay of the pending-sync ledger with exponential backoff
//! - An in-memory remote for tests and offline development
//!
//! ## Architecture
//!
//! Writes go **remote first, local always**:
//! 1. Upsert the payload remotely
//! 2. Mirror the accepted payload into the local record store
//! 3. On remote failure, keep the payload locally and leave it pending
//!
//! Reads prefer the remote and fall back to the local mirror.
//!
//! ## Key Invariants
//!
//! - A write is never lost: it reaches local storage or the caller is told
//!   it reached nowhere
//! - A pair leaves the ledger only once the remote has accepted its payload
//!   or its local data is gone
//! - Local deletes are never rolled back because of a remote failure
//! - No operation returns early with an error the caller must handle to
//!   keep working; failures travel in `SyncReport`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod memory;
mod remote;
mod report;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::SyncCoordinator;
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use memory::MemoryRemote;
pub use remote::{RemoteStore, UserDataRow};
pub use report::{ConnectionProbe, ReplayReport, SyncReport, SyncStats, WriteScope};
