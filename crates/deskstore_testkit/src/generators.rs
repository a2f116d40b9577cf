//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data that satisfies the
//! store's key rules.

use deskstore_core::Fields;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating valid module names.
pub fn module_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Module name is reserved", |s| s != "pending" && s != "quarantine")
}

/// Strategy for generating valid owner ids. Separators are allowed.
pub fn owner_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9_@.-]{1,24}").expect("Invalid regex")
}

/// Strategy for generating scalar JSON values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for generating record payloads.
///
/// Field names never collide with reserved record fields.
pub fn payload_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map("f[a-z]{0,7}", scalar_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect::<Map<String, Value>>())
}

/// Strategy for generating a batch of payloads.
pub fn payload_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Fields>> {
    prop::collection::vec(payload_strategy(), 0..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskstore_core::{validate_module, validate_owner, RESERVED_FIELDS};

    proptest! {
        #[test]
        fn generated_names_are_valid(module in module_name_strategy(), owner in owner_id_strategy()) {
            prop_assert!(validate_module(&module).is_ok());
            prop_assert!(validate_owner(&owner).is_ok());
        }

        #[test]
        fn payloads_avoid_reserved_fields(payload in payload_strategy()) {
            for key in payload.keys() {
                prop_assert!(!RESERVED_FIELDS.contains(&key.as_str()));
            }
        }
    }
}
