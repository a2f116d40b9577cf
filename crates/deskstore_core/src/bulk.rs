//! Batch mutation requests.

use crate::types::Fields;
use serde::{Deserialize, Serialize};

/// The mutation applied to every id of a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Remove the records.
    Delete,
    /// Merge `data` over each record.
    Update,
    /// Flag the records as archived.
    Archive,
}

/// A batch mutation over one module collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    /// What to do.
    pub action: BulkAction,
    /// Records to apply it to.
    pub ids: Vec<String>,
    /// Patch for [`BulkAction::Update`]; ignored otherwise.
    #[serde(default)]
    pub data: Fields,
}

impl BulkRequest {
    /// Creates a bulk delete.
    pub fn delete<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: BulkAction::Delete,
            ids: ids.into_iter().map(Into::into).collect(),
            data: Fields::new(),
        }
    }

    /// Creates a bulk update merging `data` into each record.
    pub fn update<I, S>(ids: I, data: Fields) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: BulkAction::Update,
            ids: ids.into_iter().map(Into::into).collect(),
            data,
        }
    }

    /// Creates a bulk archive.
    pub fn archive<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: BulkAction::Archive,
            ids: ids.into_iter().map(Into::into).collect(),
            data: Fields::new(),
        }
    }
}

/// Outcome of a bulk mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    /// The action applied.
    pub action: BulkAction,
    /// Number of records the action applied to.
    pub affected: usize,
}
