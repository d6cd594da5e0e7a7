//! Shared fixtures for integration tests.
//!
//! - `KeywordEmbedder`: one dimension per keyword, so test scores are exact
//! - `FaultyEngine`: a `MemoryEngine` that fails, stalls, or panics per namespace
//! - helpers to build stores and unit vectors with a chosen cosine score

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use nsrecall::storage::{
    CollectionInfo, MemoryEngine, NAMESPACE_FIELD, Point, PointFilter, ScoredPoint, StoreConfig,
    StoredPoint, VectorEngine,
};
use nsrecall::{Embedder, Error, Payload, RecordId, Result, VectorStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Vocabulary of the keyword embedder; the last dimension catches everything else.
pub const KEYWORDS: [&str; 7] = ["shoes", "boots", "hours", "menu", "noodle", "price", "sale"];

/// Vector length produced by [`KeywordEmbedder`].
pub const DIMENSIONS: usize = KEYWORDS.len() + 1;

/// Embeds text as normalized keyword counts.
#[derive(Debug, Default)]
pub struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let mut vector = vec![0.0f32; DIMENSIONS];
        for (i, keyword) in KEYWORDS.iter().enumerate() {
            vector[i] = lowered.matches(keyword).count() as f32;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[DIMENSIONS - 1] = 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        Ok(vector.into_iter().map(|v| v / norm).collect())
    }
}

/// Embedder whose every call fails.
#[derive(Debug, Default)]
pub struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::OperationFailed {
            operation: "embed".to_string(),
            cause: "model unavailable".to_string(),
        })
    }
}

/// Unit vector whose cosine similarity with the `axis` keyword query is `score`.
pub fn scored_vector(axis: usize, score: f32) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    vector[axis] = score;
    vector[DIMENSIONS - 1] = (1.0 - score * score).max(0.0).sqrt();
    vector
}

/// Fault injected into searches of one namespace.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Return an engine error.
    Error,
    /// Sleep before answering.
    Stall(Duration),
    /// Panic.
    Panic,
}

/// Memory engine with per-namespace search faults and call accounting.
#[derive(Default)]
pub struct FaultyEngine {
    inner: MemoryEngine,
    faults: Mutex<HashMap<String, Fault>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    searches: AtomicUsize,
}

impl FaultyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, namespace: &str, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .insert(namespace.to_string(), fault);
    }

    pub fn clear(&self, namespace: &str) {
        self.faults.lock().unwrap().remove(namespace);
    }

    /// Adds a fixed delay to every search.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn fault_for(filter: &PointFilter, faults: &HashMap<String, Fault>) -> Option<Fault> {
        filter
            .must
            .iter()
            .find(|m| m.key == NAMESPACE_FIELD)
            .and_then(|m| m.value.as_str())
            .and_then(|ns| faults.get(ns).copied())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl VectorEngine for FaultyEngine {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn describe_collection(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        self.inner.describe_collection(collection)
    }

    fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        self.inner.create_collection(collection, dimensions)
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        self.inner.upsert(collection, point)
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<StoredPoint>> {
        self.inner.get(collection, id)
    }

    fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        self.inner.delete(collection, id)
    }

    fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        self.inner.scroll(collection, filter, limit)
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let fault = Self::fault_for(filter, &self.faults.lock().unwrap());
        match fault {
            Some(Fault::Error) => Err(Error::OperationFailed {
                operation: "search".to_string(),
                cause: "injected failure".to_string(),
            }),
            Some(Fault::Stall(duration)) => {
                std::thread::sleep(duration);
                self.inner.search(collection, vector, filter, limit)
            },
            Some(Fault::Panic) => panic!("injected panic"),
            None => self.inner.search(collection, vector, filter, limit),
        }
    }

    fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize> {
        self.inner.count(collection, filter)
    }
}

/// Store over a plain memory engine with the keyword embedder.
pub fn memory_store() -> Arc<VectorStore> {
    Arc::new(
        VectorStore::new(
            Arc::new(MemoryEngine::new()),
            Arc::new(KeywordEmbedder),
            StoreConfig::default(),
        )
        .unwrap(),
    )
}

/// Store over a faulty engine, returning both.
pub fn faulty_store() -> (Arc<VectorStore>, Arc<FaultyEngine>) {
    let engine = Arc::new(FaultyEngine::new());
    let store = VectorStore::new(
        Arc::clone(&engine) as Arc<dyn VectorEngine>,
        Arc::new(KeywordEmbedder),
        StoreConfig::default(),
    )
    .unwrap();
    (Arc::new(store), engine)
}

/// Stores a record with a precomputed vector scoring `score` against the `axis` query.
pub fn put_scored(store: &VectorStore, namespace: &str, key: &str, content: &str, axis: usize, score: f32) {
    store
        .put(
            namespace,
            key,
            Payload::new(content).with_embedding(scored_vector(axis, score)),
        )
        .unwrap();
}

/// Owned namespace list.
pub fn namespaces(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}
