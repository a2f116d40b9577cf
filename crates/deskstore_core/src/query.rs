//! In-memory query over a loaded collection: search, filter, sort, page.

use crate::types::{Fields, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// A query over one module collection.
///
/// Stages run in a fixed order: search, filter, sort, page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Case-insensitive substring matched against the serialized record.
    pub search: Option<String>,
    /// Fields that must equal the given values exactly.
    #[serde(default)]
    pub filter: Fields,
    /// Field to sort by.
    pub sort_by: Option<String>,
    /// Sort direction.
    #[serde(default)]
    pub sort: SortOrder,
    /// 1-based page number.
    pub page: Option<usize>,
    /// Page size; everything when absent.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates an empty query that returns the whole collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the search text.
    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Adds an exact-match filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    /// Sets the sort field and direction.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort = order;
        self
    }

    /// Sets the page and page size.
    #[must_use]
    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    /// Runs the query over `records`.
    pub fn apply(&self, records: Vec<Record>) -> QueryPage {
        let mut items = records;

        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            items.retain(|record| {
                serde_json::to_string(record)
                    .map(|text| text.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });
        }

        if !self.filter.is_empty() {
            items.retain(|record| {
                self.filter
                    .iter()
                    .all(|(field, expected)| record.field(field).as_ref() == Some(expected))
            });
        }

        if let Some(field) = &self.sort_by {
            items.sort_unstable_by(|a, b| {
                let ordering = compare_values(a.field(field).as_ref(), b.field(field).as_ref());
                match self.sort {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let total = items.len();
        let page = self.page.unwrap_or(1).max(1);
        let (items, limit, total_pages) = match self.limit.filter(|l| *l > 0) {
            Some(limit) => {
                let start = (page - 1).saturating_mul(limit);
                let paged: Vec<Record> = items.into_iter().skip(start).take(limit).collect();
                (paged, Some(limit), total.div_ceil(limit))
            }
            None => (items, None, usize::from(total > 0)),
        };

        QueryPage {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    /// Records on this page.
    pub items: Vec<Record>,
    /// Number of records matching search and filter, across all pages.
    pub total: usize,
    /// The 1-based page returned.
    pub page: usize,
    /// Page size, if paging was requested.
    pub limit: Option<usize>,
    /// Number of pages.
    pub total_pages: usize,
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Orders JSON values: missing and null first, then booleans, numbers,
/// strings, arrays and objects. Numbers compare numerically and strings
/// lexicographically; arrays and objects are not ordered among themselves.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
