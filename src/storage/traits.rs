//! Storage engine trait.
//!
//! A [`VectorEngine`] stores points (id, vector, JSON payload) in named
//! collections and answers filtered nearest-neighbor queries. The
//! [`VectorStore`](super::VectorStore) is the only caller; it owns the
//! namespace/key conventions and the payload layout.
//!
//! # Available Implementations
//!
//! | Engine | Use Case | Configuration |
//! |--------|----------|---------------|
//! | `MemoryEngine` | Tests, local development, single node | Optional JSON file |
//! | `QdrantEngine` | Shared deployments | Qdrant URL and API key |
//! | `ResilientEngine` | Circuit breaking around either | Breaker thresholds |

use crate::Result;
use crate::models::RecordId;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Equality predicate on a top-level payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    /// Payload field name.
    pub key: String,
    /// Value the field must equal.
    pub value: Value,
}

/// Conjunction of payload predicates. An empty filter matches every point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointFilter {
    /// Predicates that must all hold.
    pub must: Vec<FieldMatch>,
}

impl PointFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self { must: Vec::new() }
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn with_field_equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Returns true if the filter has no predicates.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Evaluates the filter against a payload.
    #[must_use]
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must
            .iter()
            .all(|m| payload.get(&m.key).is_some_and(|v| *v == m.value))
    }
}

/// A point to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Point identifier.
    pub id: RecordId,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Stored payload.
    pub payload: Map<String, Value>,
}

/// A point read back without its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    /// Point identifier.
    pub id: RecordId,
    /// Stored payload.
    pub payload: Map<String, Value>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    /// Point identifier.
    pub id: RecordId,
    /// Stored payload.
    pub payload: Map<String, Value>,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Collection metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Vector length fixed at creation.
    pub dimensions: usize,
    /// Number of stored points, when the engine reports it.
    pub points: Option<usize>,
}

/// Trait for vector storage engines.
///
/// Engines are synchronous and shared across threads; implementations use
/// interior mutability for writes.
pub trait VectorEngine: Send + Sync {
    /// Short engine name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Returns collection metadata, or `None` if the collection does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    fn describe_collection(&self, collection: &str) -> Result<Option<CollectionInfo>>;

    /// Creates a cosine-distance collection with the given vector length.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()>;

    /// Creates a keyword index on a payload field. Engines without payload
    /// indexes accept the call and do nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be created.
    fn create_keyword_index(&self, _collection: &str, _field: &str) -> Result<()> {
        Ok(())
    }

    /// Inserts or replaces a point.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the vector length is wrong.
    fn upsert(&self, collection: &str, point: Point) -> Result<()>;

    /// Fetches a point by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<StoredPoint>>;

    /// Removes a point. Removing an absent point succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, collection: &str, id: &RecordId) -> Result<()>;

    /// Returns up to `limit` points matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn scroll(&self, collection: &str, filter: &PointFilter, limit: usize)
    -> Result<Vec<StoredPoint>>;

    /// Returns up to `limit` points matching the filter, most similar first.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails or the vector length is wrong.
    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Counts points matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize>;

    /// Returns true if the engine is reachable.
    fn health_check(&self) -> bool {
        true
    }
}

impl<E: VectorEngine + ?Sized> VectorEngine for Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn describe_collection(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        (**self).describe_collection(collection)
    }

    fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        (**self).create_collection(collection, dimensions)
    }

    fn create_keyword_index(&self, collection: &str, field: &str) -> Result<()> {
        (**self).create_keyword_index(collection, field)
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        (**self).upsert(collection, point)
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<StoredPoint>> {
        (**self).get(collection, id)
    }

    fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        (**self).delete(collection, id)
    }

    fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        (**self).scroll(collection, filter, limit)
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        (**self).search(collection, vector, filter, limit)
    }

    fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize> {
        (**self).count(collection, filter)
    }

    fn health_check(&self) -> bool {
        (**self).health_check()
    }
}
