//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The write would exceed the storage quota.
    #[error("storage quota exceeded: {requested} bytes requested, quota is {quota} bytes")]
    QuotaExceeded {
        /// Total size the storage would reach after the write.
        requested: u64,
        /// The configured quota.
        quota: u64,
    },

    /// A stored value is not valid UTF-8.
    #[error("stored value for key {key:?} is not valid UTF-8")]
    InvalidEncoding {
        /// The offending key.
        key: String,
    },
}

impl StorageError {
    /// Returns true if the error was caused by running out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}
