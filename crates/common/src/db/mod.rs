//! Data layer for FunFood
//!
//! Provides:
//! - The schema-less [`Document`] record type
//! - The [`Repository`] trait every service reads and writes through
//! - An in-process JSON repository with optional file persistence

mod repository;

pub use repository::JsonRepository;

use crate::errors::Result;
use crate::query::FilterClause;
use async_trait::async_trait;
use serde_json::Value;

/// A stored record: a flat JSON object keyed by field name
pub type Document = serde_json::Map<String, Value>;

/// Name of the primary key field on every record
pub const ID_FIELD: &str = "id";

/// Extract the integer id of a record, accepting numeric strings
pub fn record_id(doc: &Document) -> Option<i64> {
    match doc.get(ID_FIELD)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Repository over named collections of documents
///
/// Reads hand out owned copies, so callers never hold a lock while they
/// filter, sort, or enrich. Writers are serialised by the implementation.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Names of every known collection
    async fn collections(&self) -> Vec<String>;

    /// Full copy of a collection in insertion order
    async fn snapshot(&self, collection: &str) -> Result<Vec<Document>>;

    /// Point lookup by primary key
    async fn find_by_id(&self, collection: &str, id: i64) -> Result<Option<Document>>;

    /// Every record whose `field` loosely equals one of `values`
    async fn find_where_in(
        &self,
        collection: &str,
        field: &str,
        values: &[Value],
    ) -> Result<Vec<Document>>;

    /// Every record satisfying all clauses
    async fn find_many(&self, collection: &str, clauses: &[FilterClause]) -> Result<Vec<Document>>;

    /// First record satisfying all clauses
    async fn find_one(&self, collection: &str, clauses: &[FilterClause]) -> Result<Option<Document>> {
        Ok(self.find_many(collection, clauses).await?.into_iter().next())
    }

    /// Insert a record, assigning a fresh id
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document>;

    /// Shallow-merge `patch` into the record with `id`
    async fn update(&self, collection: &str, id: i64, patch: Document) -> Result<Option<Document>>;

    /// Remove the record with `id`, returning it
    async fn delete(&self, collection: &str, id: i64) -> Result<Option<Document>>;

    /// Add `by` to a numeric field as one read-modify-write step
    ///
    /// A missing or non-numeric field counts as zero.
    async fn increment(
        &self,
        collection: &str,
        id: i64,
        field: &str,
        by: f64,
    ) -> Result<Option<Document>>;
}
