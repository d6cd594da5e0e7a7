//! Namespace-partitioned key/value store with similarity search.
//!
//! Every record is one point in a shared collection. The point id is derived
//! from `(namespace, key)` and the payload carries:
//!
//! | Field | Content |
//! |-------|---------|
//! | `namespace` | Owning namespace, used as the search/list filter |
//! | `key` | Record key |
//! | `value` | The caller's [`Payload`] as JSON |
//! | `text_content` | Text that was embedded (empty for precomputed vectors) |
//!
//! Reads never fail: `get`, `list`, and `search` log engine errors and return
//! an empty result. Writes propagate errors.

use super::traits::{Point, PointFilter, ScoredPoint, StoredPoint, VectorEngine};
use crate::embedding::Embedder;
use crate::models::{Payload, RecordId, ScoredRecord};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Payload field holding the namespace.
pub const NAMESPACE_FIELD: &str = "namespace";

/// Default upper bound for [`VectorStore::list`].
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Collection name.
    pub collection: String,
    /// Expected vector length. `None` accepts whatever the embedder produces.
    pub dimensions: Option<usize>,
    /// Create a keyword index on the namespace field when creating the collection.
    pub namespace_index: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: "nsrecall_store".to_string(),
            dimensions: None,
            namespace_index: true,
        }
    }
}

impl StoreConfig {
    /// Sets the collection name.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the expected vector length.
    #[must_use]
    pub const fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Sets whether to index the namespace field.
    #[must_use]
    pub const fn with_namespace_index(mut self, enabled: bool) -> Self {
        self.namespace_index = enabled;
        self
    }
}

/// Namespace-partitioned vector store.
///
/// Construct once and share as `Arc<VectorStore>`; all methods take `&self`.
pub struct VectorStore {
    engine: Arc<dyn VectorEngine>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    dimensions: usize,
}

impl VectorStore {
    /// Opens the store, creating the collection if it does not exist.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the embedder's vector length differs
    ///   from the configured or existing collection's.
    /// - [`Error::Configuration`] for an empty collection name or zero-length embedder.
    /// - Engine errors while describing or creating the collection.
    pub fn new(
        engine: Arc<dyn VectorEngine>,
        embedder: Arc<dyn Embedder>,
        config: StoreConfig,
    ) -> Result<Self> {
        let dimensions = embedder.dimensions();
        if dimensions == 0 {
            return Err(Error::Configuration(
                "embedder reports zero dimensions".to_string(),
            ));
        }
        if config.collection.trim().is_empty() {
            return Err(Error::Configuration(
                "collection name must not be empty".to_string(),
            ));
        }
        if let Some(expected) = config.dimensions
            && expected != dimensions
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: dimensions,
            });
        }

        let store = Self {
            engine,
            embedder,
            collection: config.collection,
            dimensions,
        };
        store.ensure_collection(config.namespace_index)?;
        Ok(store)
    }

    fn ensure_collection(&self, namespace_index: bool) -> Result<()> {
        if let Some(info) = self.engine.describe_collection(&self.collection)? {
            return self.check_collection_dimensions(info.dimensions);
        }

        if let Err(create_err) = self
            .engine
            .create_collection(&self.collection, self.dimensions)
        {
            // Another process may have created it first.
            return match self.engine.describe_collection(&self.collection)? {
                Some(info) => self.check_collection_dimensions(info.dimensions),
                None => Err(create_err),
            };
        }

        tracing::info!(
            collection = %self.collection,
            dimensions = self.dimensions,
            engine = self.engine.name(),
            "Created vector collection"
        );

        if namespace_index
            && let Err(e) = self
                .engine
                .create_keyword_index(&self.collection, NAMESPACE_FIELD)
        {
            tracing::warn!(collection = %self.collection, error = %e, "Failed to index namespace field");
        }
        Ok(())
    }

    fn check_collection_dimensions(&self, expected: usize) -> Result<()> {
        if expected == self.dimensions {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected,
                actual: self.dimensions,
            })
        }
    }

    /// Returns the collection's vector length.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Returns the engine name.
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Returns true if the engine is reachable.
    #[must_use]
    pub fn health_check(&self) -> bool {
        self.engine.health_check()
    }

    /// Inserts or overwrites the record at `(namespace, key)`.
    ///
    /// Uses `payload.embedding` as the vector when present; otherwise embeds
    /// `"namespace: {namespace}, key: {key}, value: {payload json}"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty namespace or key, a
    /// vector of the wrong length, or a vector with non-finite components.
    /// Embedding and engine errors are propagated.
    #[instrument(skip(self, payload), fields(operation = "store.put"))]
    pub fn put(&self, namespace: &str, key: &str, mut payload: Payload) -> Result<()> {
        validate_address(namespace, key)?;

        let value = payload.to_json()?;
        let (vector, text_content) = match payload.embedding.take() {
            Some(vector) => (vector, String::new()),
            None => {
                let text = format!("namespace: {namespace}, key: {key}, value: {value}");
                (self.embedder.embed(&text)?, text)
            },
        };
        check_vector(&vector, self.dimensions, "vector")?;

        let mut stored = Map::new();
        stored.insert(NAMESPACE_FIELD.to_string(), Value::from(namespace));
        stored.insert("key".to_string(), Value::from(key));
        stored.insert("value".to_string(), value);
        stored.insert("text_content".to_string(), Value::from(text_content));

        let result = self.engine.upsert(
            &self.collection,
            Point {
                id: RecordId::new(namespace, key),
                vector,
                payload: stored,
            },
        );
        record_operation("put", result.is_ok());
        result
    }

    /// Returns the payload at `(namespace, key)`, or `None` if absent or unreadable.
    #[instrument(skip(self), fields(operation = "store.get"))]
    pub fn get(&self, namespace: &str, key: &str) -> Option<Payload> {
        let id = RecordId::new(namespace, key);
        match self.engine.get(&self.collection, &id) {
            Ok(point) => {
                record_operation("get", true);
                point.and_then(|p| decode_point(&p).map(|(_, payload)| payload))
            },
            Err(e) => {
                record_operation("get", false);
                tracing::warn!(namespace, key, error = %e, "Failed to read record");
                None
            },
        }
    }

    /// Removes the record at `(namespace, key)`. Absent records are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the delete.
    #[instrument(skip(self), fields(operation = "store.delete"))]
    pub fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let result = self
            .engine
            .delete(&self.collection, &RecordId::new(namespace, key));
        record_operation("delete", result.is_ok());
        result
    }

    /// Lists up to `limit` records in a namespace.
    #[instrument(skip(self), fields(operation = "store.list"))]
    pub fn list(&self, namespace: &str, limit: usize) -> Vec<(String, Payload)> {
        match self
            .engine
            .scroll(&self.collection, &namespace_filter(namespace), limit)
        {
            Ok(points) => {
                record_operation("list", true);
                points.iter().filter_map(decode_point).collect()
            },
            Err(e) => {
                record_operation("list", false);
                tracing::warn!(namespace, error = %e, "Failed to list namespace");
                Vec::new()
            },
        }
    }

    /// Semantic search within one namespace, best first.
    ///
    /// Returns an empty list for blank queries, embedding failures, and
    /// engine errors.
    #[instrument(skip(self, query), fields(operation = "store.search", query_len = query.len()))]
    pub fn search(&self, namespace: &str, query: &str, limit: usize) -> Vec<ScoredRecord> {
        let vector = match self.embed_query(query) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Failed to embed search query");
                return Vec::new();
            },
        };

        self.search_vector(namespace, &vector, limit)
            .unwrap_or_else(|e| {
                tracing::warn!(namespace, error = %e, "Namespace search failed");
                Vec::new()
            })
    }

    /// Embeds a query for use with [`VectorStore::search_vector`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for blank queries or a query vector
    /// with non-finite components, the embedder's error if embedding fails,
    /// and [`Error::DimensionMismatch`] if the embedder returns a vector of
    /// the wrong length.
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        let vector = self.embedder.embed(query)?;
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        check_vector(&vector, self.dimensions, "query vector")?;
        Ok(vector)
    }

    /// Nearest-neighbor search within one namespace for a precomputed vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a vector of the wrong length or
    /// with non-finite components, and propagates engine errors.
    pub fn search_vector(
        &self,
        namespace: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        check_vector(vector, self.dimensions, "query vector")?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let result =
            self.engine
                .search(&self.collection, vector, &namespace_filter(namespace), limit);
        record_operation("search", result.is_ok());
        metrics::histogram!("vector_store_search_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        let mut records: Vec<ScoredRecord> = result?
            .iter()
            .filter_map(decode_hit)
            .collect();
        records.sort_by(|a, b| b.2.total_cmp(&a.2));
        records.truncate(limit);
        Ok(records)
    }

    /// Counts all records in the collection.
    ///
    /// # Errors
    ///
    /// Propagates engine errors.
    pub fn count(&self) -> Result<usize> {
        self.engine.count(&self.collection, &PointFilter::new())
    }

    /// Counts records in one namespace.
    ///
    /// # Errors
    ///
    /// Propagates engine errors.
    pub fn count_namespace(&self, namespace: &str) -> Result<usize> {
        self.engine
            .count(&self.collection, &namespace_filter(namespace))
    }
}

fn validate_address(namespace: &str, key: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(Error::InvalidInput("namespace must not be empty".to_string()));
    }
    if key.trim().is_empty() {
        return Err(Error::InvalidInput("key must not be empty".to_string()));
    }
    Ok(())
}

fn check_vector(vector: &[f32], dimensions: usize, what: &str) -> Result<()> {
    if vector.len() != dimensions {
        return Err(Error::InvalidInput(format!(
            "{what} length {} does not match collection dimensions {dimensions}",
            vector.len()
        )));
    }
    // NaN scores would sort ahead of every real match.
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "{what} has a non-finite value at index {index}"
        )));
    }
    Ok(())
}

fn namespace_filter(namespace: &str) -> PointFilter {
    PointFilter::new().with_field_equals(NAMESPACE_FIELD, namespace)
}

fn decode_payload(payload: &Map<String, Value>) -> Option<(String, Payload)> {
    let key = payload.get("key").and_then(Value::as_str)?;
    let value = payload.get("value")?;
    match Payload::from_json(value.clone()) {
        Ok(decoded) => Some((key.to_string(), decoded)),
        Err(e) => {
            tracing::debug!(key, error = %e, "Skipping point with undecodable value");
            None
        },
    }
}

fn decode_point(point: &StoredPoint) -> Option<(String, Payload)> {
    decode_payload(&point.payload)
}

fn decode_hit(hit: &ScoredPoint) -> Option<ScoredRecord> {
    decode_payload(&hit.payload).map(|(key, payload)| (key, payload, hit.score))
}

fn record_operation(operation: &'static str, ok: bool) {
    metrics::counter!(
        "vector_store_operations_total",
        "operation" => operation,
        "status" => if ok { "success" } else { "error" }
    )
    .increment(1);
}
