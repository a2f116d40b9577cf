//! Record and collection types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names owned by the store rather than by the feature module.
pub const RESERVED_FIELDS: &[&str] = &["id", "ownerId", "createdAt", "updatedAt", "syncStatus"];

/// A record's payload: module-defined fields.
pub type Fields = Map<String, Value>;

/// Advisory synchronization state of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Written locally, not known to the remote store.
    #[default]
    Local,
    /// Confirmed by the remote store.
    Synced,
    /// Queued for the remote store.
    Pending,
    /// Diverged from the remote store.
    Conflict,
}

/// The atomic unit of storage.
///
/// Serialized as a flat JSON object: the reserved fields sit next to the
/// module-defined payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique within (owner, module); never reassigned.
    pub id: String,
    /// Owner of the record.
    #[serde(default)]
    pub owner_id: String,
    /// Creation time, ISO-8601.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last mutation time, ISO-8601.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Advisory sync state.
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Module-defined payload.
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Creates an unstamped record with the given id and owner.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            created_at: None,
            updated_at: None,
            sync_status: SyncStatus::Local,
            fields: Fields::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns the value of any field, reserved ones included.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "ownerId" => Some(Value::String(self.owner_id.clone())),
            "createdAt" => self.created_at.clone().map(Value::String),
            "updatedAt" => self.updated_at.clone().map(Value::String),
            "syncStatus" => serde_json::to_value(self.sync_status).ok(),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Merges `patch` over the payload.
    ///
    /// Identity and timestamps are owned by the store and are never taken
    /// from a patch; `syncStatus` is accepted when it names a valid state.
    pub fn apply_patch(&mut self, patch: &Fields) {
        for (name, value) in patch {
            match name.as_str() {
                "id" | "ownerId" | "createdAt" | "updatedAt" => {}
                "syncStatus" => {
                    if let Ok(status) = serde_json::from_value(value.clone()) {
                        self.sync_status = status;
                    }
                }
                _ => {
                    self.fields.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

/// Strips reserved fields from a payload supplied by a caller.
pub(crate) fn payload_only(partial: Fields) -> Fields {
    partial
        .into_iter()
        .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_flat_camel_case() {
        let mut record = Record::new("r1", "u1").with_field("title", "A");
        record.created_at = Some("2026-01-01T00:00:00.000Z".into());
        record.updated_at = record.created_at.clone();

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "r1",
                "ownerId": "u1",
                "createdAt": "2026-01-01T00:00:00.000Z",
                "updatedAt": "2026-01-01T00:00:00.000Z",
                "syncStatus": "local",
                "title": "A"
            })
        );
    }

    #[test]
    fn record_deserializes_with_missing_metadata() {
        let record: Record = serde_json::from_value(json!({"id": "x", "done": true})).unwrap();
        assert_eq!(record.id, "x");
        assert_eq!(record.owner_id, "");
        assert!(record.updated_at.is_none());
        assert_eq!(record.sync_status, SyncStatus::Local);
        assert_eq!(record.fields.get("done"), Some(&json!(true)));
    }

    #[test]
    fn field_reads_reserved_and_payload() {
        let record = Record::new("r1", "u1").with_field("priority", 3);
        assert_eq!(record.field("id"), Some(json!("r1")));
        assert_eq!(record.field("syncStatus"), Some(json!("local")));
        assert_eq!(record.field("priority"), Some(json!(3)));
        assert_eq!(record.field("createdAt"), None);
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn patch_cannot_rewrite_identity() {
        let mut record = Record::new("r1", "u1").with_field("title", "A");
        let patch = json!({"id": "evil", "ownerId": "u2", "title": "B", "syncStatus": "pending"});
        record.apply_patch(patch.as_object().unwrap());

        assert_eq!(record.id, "r1");
        assert_eq!(record.owner_id, "u1");
        assert_eq!(record.fields.get("title"), Some(&json!("B")));
        assert_eq!(record.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn payload_only_drops_reserved_fields() {
        let partial = json!({"id": "x", "createdAt": "t", "title": "A"});
        let payload = payload_only(partial.as_object().unwrap().clone());
        assert_eq!(payload.len(), 1);
        assert!(payload.contains_key("title"));
    }
}
