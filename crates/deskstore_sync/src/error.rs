//! Error types for the sync coordinator and remote stores.

use thiserror::Error;

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by a remote store.
///
/// "No such row" is not an error: selects return `Ok(None)` for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote store cannot be reached.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The remote store refused the request (constraint, permission,
    /// malformed payload).
    #[error("remote store rejected the request: {0}")]
    Rejected(String),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },
}

impl RemoteError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport { retryable, .. } => *retryable,
            RemoteError::Unavailable(_) => true,
            RemoteError::Rejected(_) => false,
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote store error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local store error.
    #[error("local store error: {0}")]
    Local(#[from] deskstore_core::CoreError),

    /// No remote store is configured.
    #[error("remote store not configured")]
    NotConfigured,
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Local(_) | SyncError::NotConfigured => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::transport_retryable("connection reset").is_retryable());
        assert!(!RemoteError::transport_fatal("bad certificate").is_retryable());
        assert!(RemoteError::Unavailable("offline".into()).is_retryable());
        assert!(!RemoteError::Rejected("constraint".into()).is_retryable());
        assert!(!SyncError::NotConfigured.is_retryable());
        assert!(SyncError::from(RemoteError::Unavailable("x".into())).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConfigured;
        assert_eq!(err.to_string(), "remote store not configured");

        let err = SyncError::from(RemoteError::Rejected("duplicate key".into()));
        assert_eq!(
            err.to_string(),
            "remote store rejected the request: duplicate key"
        );
    }
}
