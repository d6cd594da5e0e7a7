//! In-process brute-force engine.
//!
//! Keeps every collection in a `RwLock`-guarded map and answers searches by
//! scoring each matching point with cosine similarity. With a path configured,
//! the whole engine is written to a JSON file after every mutation and read
//! back on construction.

use super::traits::{CollectionInfo, Point, PointFilter, ScoredPoint, StoredPoint, VectorEngine};
use crate::embedding::cosine_similarity;
use crate::models::RecordId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    points: BTreeMap<RecordId, Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

/// Brute-force in-memory vector engine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    collections: RwLock<HashMap<String, Collection>>,
    path: Option<PathBuf>,
}

impl MemoryEngine {
    /// Creates an empty, non-persistent engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine persisted to `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let collections = if path.exists() {
            Self::load(&path)?
        } else {
            HashMap::new()
        };

        tracing::debug!(
            path = %path.display(),
            collections = collections.len(),
            "Opened memory vector engine"
        );

        Ok(Self {
            collections: RwLock::new(collections),
            path: Some(path),
        })
    }

    /// Returns the persistence path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load(path: &Path) -> Result<HashMap<String, Collection>> {
        let content = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "load_memory_engine".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::OperationFailed {
            operation: "parse_memory_engine".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }

    fn save(&self, collections: &HashMap<String, Collection>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_memory_engine_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let content = serde_json::to_string(collections).map_err(|e| Error::OperationFailed {
            operation: "serialize_memory_engine".to_string(),
            cause: e.to_string(),
        })?;

        // Replace atomically via a sibling temp file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| Error::OperationFailed {
            operation: "write_memory_engine".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp, path).map_err(|e| Error::OperationFailed {
            operation: "write_memory_engine".to_string(),
            cause: e.to_string(),
        })
    }

    fn missing(collection: &str) -> Error {
        Error::OperationFailed {
            operation: "memory_engine".to_string(),
            cause: format!("collection '{collection}' not found"),
        }
    }

    fn check_dimensions(expected: usize, vector: &[f32]) -> Result<()> {
        if vector.len() == expected {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "vector length {} does not match collection dimensions {expected}",
                vector.len()
            )))
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut HashMap<String, Collection>) -> Result<T>) -> Result<T> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.path.is_none() {
            return f(&mut collections);
        }

        // A persisted engine only publishes state that reached disk.
        let mut staged = collections.clone();
        let value = f(&mut staged)?;
        self.save(&staged)?;
        *collections = staged;
        Ok(value)
    }

    fn read<T>(&self, collection: &str, f: impl FnOnce(&Collection) -> Result<T>) -> Result<T> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let found = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;
        f(found)
    }
}

impl VectorEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn describe_collection(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections.get(collection).map(|c| CollectionInfo {
            dimensions: c.dimensions,
            points: Some(c.points.len()),
        }))
    }

    fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        if dimensions == 0 {
            return Err(Error::InvalidInput(
                "collection dimensions must be positive".to_string(),
            ));
        }
        self.mutate(|collections| {
            if let Some(existing) = collections.get(collection) {
                return Err(Error::OperationFailed {
                    operation: "create_collection".to_string(),
                    cause: format!(
                        "collection '{collection}' already exists with {} dimensions",
                        existing.dimensions
                    ),
                });
            }
            collections.insert(
                collection.to_string(),
                Collection {
                    dimensions,
                    points: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        self.mutate(|collections| {
            let target = collections
                .get_mut(collection)
                .ok_or_else(|| Self::missing(collection))?;
            Self::check_dimensions(target.dimensions, &point.vector)?;
            target.points.insert(
                point.id,
                Entry {
                    vector: point.vector,
                    payload: point.payload,
                },
            );
            Ok(())
        })
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<StoredPoint>> {
        self.read(collection, |c| {
            Ok(c.points.get(id).map(|entry| StoredPoint {
                id: *id,
                payload: entry.payload.clone(),
            }))
        })
    }

    fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        self.mutate(|collections| {
            let target = collections
                .get_mut(collection)
                .ok_or_else(|| Self::missing(collection))?;
            target.points.remove(id);
            Ok(())
        })
    }

    fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        self.read(collection, |c| {
            Ok(c.points
                .iter()
                .filter(|(_, entry)| filter.matches(&entry.payload))
                .take(limit)
                .map(|(id, entry)| StoredPoint {
                    id: *id,
                    payload: entry.payload.clone(),
                })
                .collect())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.read(collection, |c| {
            Self::check_dimensions(c.dimensions, vector)?;

            let mut hits: Vec<ScoredPoint> = c
                .points
                .iter()
                .filter(|(_, entry)| filter.matches(&entry.payload))
                .map(|(id, entry)| ScoredPoint {
                    id: *id,
                    payload: entry.payload.clone(),
                    score: cosine_similarity(vector, &entry.vector),
                })
                .collect();

            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(limit);
            Ok(hits)
        })
    }

    fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize> {
        self.read(collection, |c| {
            Ok(c.points
                .values()
                .filter(|entry| filter.matches(&entry.payload))
                .count())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn point(ns: &str, key: &str, vector: Vec<f32>) -> Point {
        let mut payload = Map::new();
        payload.insert("namespace".to_string(), json!(ns));
        payload.insert("key".to_string(), json!(key));
        Point {
            id: RecordId::new(ns, key),
            vector,
            payload,
        }
    }

    fn engine_with_collection() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.create_collection("c", 2).unwrap();
        engine
    }

    #[test]
    fn test_describe_missing_collection() {
        let engine = MemoryEngine::new();
        assert!(engine.describe_collection("c").unwrap().is_none());
    }

    #[test]
    fn test_create_collection_twice_fails() {
        let engine = engine_with_collection();
        assert!(engine.create_collection("c", 2).is_err());
        assert!(engine.create_collection("d", 0).is_err());
        let info = engine.describe_collection("c").unwrap().unwrap();
        assert_eq!(info.dimensions, 2);
        assert_eq!(info.points, Some(0));
    }

    #[test]
    fn test_upsert_replaces_point() {
        let engine = engine_with_collection();
        engine.upsert("c", point("n", "k", vec![1.0, 0.0])).unwrap();
        let mut replacement = point("n", "k", vec![0.0, 1.0]);
        replacement.payload.insert("v".to_string(), json!(2));
        engine.upsert("c", replacement).unwrap();

        assert_eq!(engine.count("c", &PointFilter::new()).unwrap(), 1);
        let stored = engine.get("c", &RecordId::new("n", "k")).unwrap().unwrap();
        assert_eq!(stored.payload["v"], 2);
    }

    #[test]
    fn test_upsert_rejects_wrong_dimensions() {
        let engine = engine_with_collection();
        let err = engine
            .upsert("c", point("n", "k", vec![1.0, 0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_operations_on_missing_collection_fail() {
        let engine = MemoryEngine::new();
        assert!(engine.upsert("c", point("n", "k", vec![1.0])).is_err());
        assert!(engine.get("c", &RecordId::new("n", "k")).is_err());
        assert!(engine.search("c", &[1.0], &PointFilter::new(), 5).is_err());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let engine = engine_with_collection();
        engine.upsert("c", point("n", "k", vec![1.0, 0.0])).unwrap();
        let id = RecordId::new("n", "k");
        engine.delete("c", &id).unwrap();
        engine.delete("c", &id).unwrap();
        assert!(engine.get("c", &id).unwrap().is_none());
    }

    #[test]
    fn test_search_filters_and_orders() {
        let engine = engine_with_collection();
        engine.upsert("c", point("a", "near", vec![1.0, 0.1])).unwrap();
        engine.upsert("c", point("a", "far", vec![0.0, 1.0])).unwrap();
        engine.upsert("c", point("b", "exact", vec![1.0, 0.0])).unwrap();

        let filter = PointFilter::new().with_field_equals("namespace", "a");
        let hits = engine.search("c", &[1.0, 0.0], &filter, 10).unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.payload["key"].clone()).collect();
        assert_eq!(keys, vec![json!("near"), json!("far")]);
        assert!(hits[0].score > hits[1].score);

        let top = engine.search("c", &[1.0, 0.0], &PointFilter::new(), 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].payload["key"], "exact");
    }

    #[test]
    fn test_scroll_respects_filter_and_limit() {
        let engine = engine_with_collection();
        for i in 0..5 {
            engine
                .upsert("c", point("a", &format!("k{i}"), vec![1.0, 0.0]))
                .unwrap();
        }
        engine.upsert("c", point("b", "other", vec![1.0, 0.0])).unwrap();

        let filter = PointFilter::new().with_field_equals("namespace", "a");
        assert_eq!(engine.scroll("c", &filter, 3).unwrap().len(), 3);
        assert_eq!(engine.scroll("c", &filter, 100).unwrap().len(), 5);
        assert_eq!(engine.count("c", &filter).unwrap(), 5);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("engine.json");

        {
            let engine = MemoryEngine::with_path(&path).unwrap();
            engine.create_collection("c", 2).unwrap();
            engine.upsert("c", point("n", "k", vec![1.0, 0.0])).unwrap();
        }

        let reopened = MemoryEngine::with_path(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        let stored = reopened.get("c", &RecordId::new("n", "k")).unwrap();
        assert!(stored.is_some());
        assert_eq!(reopened.describe_collection("c").unwrap().unwrap().dimensions, 2);
    }

    #[test]
    fn test_failed_save_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        let engine = MemoryEngine::with_path(&path).unwrap();
        engine.create_collection("c", 2).unwrap();
        engine.upsert("c", point("n", "kept", vec![1.0, 0.0])).unwrap();

        // A directory in the temp file's place makes every save fail.
        let blocker = dir.path().join("engine.json.tmp");
        fs::create_dir(&blocker).unwrap();

        assert!(engine.upsert("c", point("n", "new", vec![0.0, 1.0])).is_err());
        assert!(engine.get("c", &RecordId::new("n", "new")).unwrap().is_none());

        assert!(engine.delete("c", &RecordId::new("n", "kept")).is_err());
        assert!(engine.get("c", &RecordId::new("n", "kept")).unwrap().is_some());

        assert!(engine.create_collection("d", 2).is_err());
        assert!(engine.describe_collection("d").unwrap().is_none());
        assert_eq!(engine.count("c", &PointFilter::new()).unwrap(), 1);

        fs::remove_dir(&blocker).unwrap();
        engine.upsert("c", point("n", "new", vec![0.0, 1.0])).unwrap();
        let reopened = MemoryEngine::with_path(&path).unwrap();
        assert_eq!(reopened.count("c", &PointFilter::new()).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "not json").unwrap();
        assert!(MemoryEngine::with_path(&path).is_err());
    }
}
