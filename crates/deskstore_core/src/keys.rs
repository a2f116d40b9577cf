//! Persisted key layout.
//!
//! ```text
//! <prefix>_<module>_<ownerId>    -> JSON array of records
//! <prefix>_pending_sync          -> JSON array of "<module>_<ownerId>"
//! <prefix>_quarantine_<module>_<ownerId>
//!                                -> quarantined raw value
//! ```
//!
//! `pending` and `quarantine` are reserved module names, so no collection
//! key can collide with the ledger or a quarantined value.

use crate::error::{CoreError, CoreResult};

/// Module name reserved by the ledger key.
const LEDGER_MODULE: &str = "pending";

/// Module name reserved for quarantined values.
pub const QUARANTINE_MODULE: &str = "quarantine";

/// Builds the storage keys of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    /// Creates a layout using `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the key of the (module, owner) collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the module name or owner id is not usable.
    pub fn collection(&self, module: &str, owner_id: &str) -> CoreResult<String> {
        validate_module(module)?;
        validate_owner(owner_id)?;
        Ok(format!("{}_{}_{}", self.prefix, module, owner_id))
    }

    /// Returns the key of the pending-sync ledger.
    pub fn ledger(&self) -> String {
        format!("{}_{LEDGER_MODULE}_sync", self.prefix)
    }

    /// Returns the key a malformed (module, owner) collection is moved to.
    ///
    /// # Errors
    ///
    /// Returns an error if the module name or owner id is not usable.
    pub fn quarantine(&self, module: &str, owner_id: &str) -> CoreResult<String> {
        validate_module(module)?;
        validate_owner(owner_id)?;
        Ok(format!(
            "{}_{QUARANTINE_MODULE}_{module}_{owner_id}",
            self.prefix
        ))
    }
}

/// Checks that a module name can be used as a key segment.
///
/// # Errors
///
/// Returns [`CoreError::InvalidModule`] for empty names, names containing
/// `_` or `:`, and the reserved names `pending` and `quarantine`, whose
/// collections would share keys with the ledger or quarantined values.
pub fn validate_module(module: &str) -> CoreResult<()> {
    if module.is_empty()
        || module.contains(['_', ':'])
        || module == LEDGER_MODULE
        || module == QUARANTINE_MODULE
    {
        return Err(CoreError::InvalidModule {
            name: module.to_string(),
        });
    }
    Ok(())
}

/// Checks that an owner id is non-empty.
///
/// # Errors
///
/// Returns [`CoreError::InvalidOwner`] for an empty id.
pub fn validate_owner(owner_id: &str) -> CoreResult<()> {
    if owner_id.is_empty() {
        return Err(CoreError::InvalidOwner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_key_layout() {
        let keys = KeyLayout::new("deskstore");
        assert_eq!(
            keys.collection("todos", "u1").unwrap(),
            "deskstore_todos_u1"
        );
        assert_eq!(keys.ledger(), "deskstore_pending_sync");
        assert_eq!(
            keys.quarantine("todos", "u1").unwrap(),
            "deskstore_quarantine_todos_u1"
        );
    }

    #[test]
    fn quarantine_key_never_matches_a_collection() {
        let keys = KeyLayout::new("app");
        let quarantined = keys.quarantine("todos", "u1").unwrap();

        // Owners may contain dots and underscores, but the quarantine module
        // itself is reserved
        assert_ne!(keys.collection("todos", "u1.corrupt").unwrap(), quarantined);
        assert_ne!(keys.collection("todos", "u1").unwrap(), quarantined);
        assert!(matches!(
            keys.collection("quarantine", "todos_u1"),
            Err(CoreError::InvalidModule { .. })
        ));
    }

    #[test]
    fn owner_may_contain_separators() {
        let keys = KeyLayout::new("app");
        assert_eq!(
            keys.collection("todos", "first_last@example.com").unwrap(),
            "app_todos_first_last@example.com"
        );
    }

    #[test]
    fn rejects_bad_module_and_owner() {
        let keys = KeyLayout::new("app");
        assert!(matches!(
            keys.collection("", "u1"),
            Err(CoreError::InvalidModule { .. })
        ));
        assert!(matches!(
            keys.collection("user_data", "u1"),
            Err(CoreError::InvalidModule { .. })
        ));
        assert!(matches!(
            keys.collection("pending", "sync"),
            Err(CoreError::InvalidModule { .. })
        ));
        assert!(matches!(
            keys.collection("todos", ""),
            Err(CoreError::InvalidOwner)
        ));
    }
}
