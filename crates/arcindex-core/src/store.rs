//! Document store abstraction.
//!
//! The pipeline writes typed records into named indices, each reachable
//! through a stable alias. Backends implement [`DocumentStore`]; the
//! `arcindex-storage` crate ships an in-memory and a SQLite backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::document::{Document, RecordKind};
use crate::error::IndexerError;

// ─── Query ────────────────────────────────────────────────────────────────────

/// Inclusive integer range filter on a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub field: String,
    pub min: u64,
    pub max: u64,
}

/// Exact string match on a field. The field `_id` matches the document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

/// Filter, ordering, and page size for store reads and deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub range: Option<RangeFilter>,
    pub term: Option<TermFilter>,
    pub sort: Option<Sort>,
    /// Page size hint for scrolls; result limit for `select_one` is always 1.
    pub size: Option<usize>,
}

impl Query {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn range(field: impl Into<String>, min: u64, max: u64) -> Self {
        Self::all().with_range(field, min, max)
    }

    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::all().with_term(field, value)
    }

    /// Match a single document by id.
    pub fn id(id: impl Into<String>) -> Self {
        Self::term("_id", id)
    }

    pub fn with_range(mut self, field: impl Into<String>, min: u64, max: u64) -> Self {
        self.range = Some(RangeFilter {
            field: field.into(),
            min,
            max,
        });
        self
    }

    pub fn with_term(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.term = Some(TermFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Returns `true` if `doc` passes the filters of this query.
    pub fn matches(&self, doc: &StoredDocument) -> bool {
        if let Some(range) = &self.range {
            match doc.u64_field(&range.field) {
                Some(v) if v >= range.min && v <= range.max => {}
                _ => return false,
            }
        }
        if let Some(term) = &self.term {
            let matched = if term.field == "_id" {
                doc.id == term.value
            } else {
                doc.str_field(&term.field) == Some(term.value.as_str())
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

// ─── StoredDocument ───────────────────────────────────────────────────────────

/// A document as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub body: serde_json::Value,
}

impl StoredDocument {
    pub fn from_document(doc: &Document) -> Result<Self, IndexerError> {
        Ok(Self {
            id: doc.id().to_string(),
            body: doc.body()?,
        })
    }

    pub fn u64_field(&self, field: &str) -> Option<u64> {
        self.body.get(field).and_then(|v| v.as_u64())
    }

    pub fn f64_field(&self, field: &str) -> Option<f64> {
        self.body.get(field).and_then(|v| v.as_f64())
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(|v| v.as_str())
    }

    /// Decode the body into a record type. The record's `id` is skipped by
    /// serde and must be restored by the caller.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, IndexerError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Merge `partial` into the body, field by field.
    pub fn merge(&mut self, partial: &serde_json::Value) {
        if let (Some(body), Some(fields)) = (self.body.as_object_mut(), partial.as_object()) {
            for (k, v) in fields {
                body.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Compare two documents on a sort field: numbers numerically, strings
/// lexically, `_id` by id. Missing values sort first.
pub fn compare_on(field: &str, a: &StoredDocument, b: &StoredDocument) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    if field == "_id" {
        return a.id.cmp(&b.id);
    }
    match (a.body.get(field), b.body.get(field)) {
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => x.as_str().unwrap_or_default().cmp(y.as_str().unwrap_or_default()),
        },
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub type DocumentStream<'a> = BoxStream<'a, Result<StoredDocument, IndexerError>>;

// ─── DocumentStore ────────────────────────────────────────────────────────────

/// Storage backend for output records.
///
/// Every operation addresses an index by name (or by alias, for reads).
/// `insert` and `bulk_commit` are upserts keyed by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Index the alias currently points to, if any.
    async fn existing_index(&self, alias: &str) -> Result<Option<String>, IndexerError>;

    /// Create an index. Creating an index that already exists is a no-op.
    async fn create_index(&self, index: &str, kind: RecordKind) -> Result<(), IndexerError>;

    /// Point `alias` at `index`, replacing any previous target.
    async fn update_alias(&self, alias: &str, index: &str) -> Result<(), IndexerError>;

    async fn insert(&self, index: &str, doc: &Document) -> Result<(), IndexerError>;

    /// Merge `partial` fields into the document with `id`. Missing documents
    /// are an error.
    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: serde_json::Value,
    ) -> Result<(), IndexerError>;

    /// Delete every matching document. Returns the number deleted.
    async fn delete(&self, index: &str, query: &Query) -> Result<u64, IndexerError>;

    async fn count(&self, index: &str, query: &Query) -> Result<u64, IndexerError>;

    /// First matching document in query order.
    async fn select_one(
        &self,
        index: &str,
        query: &Query,
    ) -> Result<Option<StoredDocument>, IndexerError>;

    /// Every matching document in query order. The stream ends after the
    /// last document.
    fn scroll<'a>(&'a self, index: &'a str, query: Query) -> DocumentStream<'a>;

    /// Write a batch atomically with respect to readers of this index.
    async fn bulk_commit(&self, index: &str, docs: &[Document]) -> Result<(), IndexerError>;
}

// ─── Index naming ─────────────────────────────────────────────────────────────

/// Physical index names per record kind, plus the alias each one sits behind.
///
/// Aliases are `{prefix}_{kind}`; fresh indices are
/// `{prefix}_{YYYY-MM-DD_HH-MM-SS}_{kind}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    prefix: String,
    indices: HashMap<RecordKind, String>,
}

impl IndexNames {
    /// Fresh index names stamped with `now`.
    pub fn fresh(prefix: &str, now: DateTime<Utc>) -> Self {
        let stamp = now.format("%Y-%m-%d_%H-%M-%S");
        let indices = RecordKind::ALL
            .iter()
            .map(|k| (*k, format!("{prefix}_{stamp}_{}", k.as_str())))
            .collect();
        Self {
            prefix: prefix.to_string(),
            indices,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn alias(&self, kind: RecordKind) -> String {
        format!("{}_{}", self.prefix, kind.as_str())
    }

    pub fn index(&self, kind: RecordKind) -> &str {
        self.indices
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Use an existing index for `kind`.
    pub fn set_index(&mut self, kind: RecordKind, index: impl Into<String>) {
        self.indices.insert(kind, index.into());
    }
}
