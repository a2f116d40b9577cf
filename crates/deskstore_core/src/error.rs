//! Error types for DeskStore core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record store operations.
///
/// Every public operation of the store reports failure through this type
/// instead of panicking; callers that only care about success can match on
/// `Ok` and keep working with their local data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error (quota exceeded, I/O).
    #[error("storage error: {0}")]
    Storage(#[from] deskstore_storage::StorageError),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {id} in module {module}")]
    RecordNotFound {
        /// Module that was searched.
        module: String,
        /// The id that was not found.
        id: String,
    },

    /// Two records in one collection share an id.
    #[error("duplicate record id in collection: {id}")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// Stored collection could not be parsed.
    #[error("corrupt collection under key {key}: {message}")]
    CorruptCollection {
        /// The storage key holding the bad value.
        key: String,
        /// Parser message.
        message: String,
    },

    /// A record mutation found valid JSON that is not a record collection.
    #[error("value under key {key} is not a record collection")]
    NotACollection {
        /// The storage key holding the value.
        key: String,
    },

    /// Module name is not usable as a key segment.
    #[error("invalid module name: {name:?}")]
    InvalidModule {
        /// The rejected name.
        name: String,
    },

    /// Owner id is empty.
    #[error("owner id must not be empty")]
    InvalidOwner,

    /// Export snapshot could not be imported.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },

    /// No identity is signed in.
    #[error("no user is signed in")]
    NotSignedIn,
}

impl CoreError {
    /// Creates a record-not-found error.
    pub fn not_found(module: &str, id: &str) -> Self {
        Self::RecordNotFound {
            module: module.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns true for the expected "record absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::RecordNotFound { .. })
    }

    /// Returns true if the error came from the storage running out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_quota_exceeded())
    }
}
