//! Storage layer.
//!
//! [`VectorStore`] is the namespace-aware facade callers use. Underneath it a
//! [`VectorEngine`] holds the points:
//! - **Memory**: brute-force cosine search with optional JSON persistence
//! - **Qdrant**: REST client for a Qdrant server
//! - **Resilient**: circuit breaker around either

// Allow cast precision loss for latency metrics.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - lock guards are scoped to one engine call.
#![allow(clippy::significant_drop_tightening)]

pub mod memory;
pub mod qdrant;
pub mod resilience;
pub mod store;
pub mod traits;

pub use memory::MemoryEngine;
pub use qdrant::QdrantEngine;
pub use resilience::{CircuitBreaker, EngineResilienceConfig, ResilientEngine};
pub use store::{DEFAULT_LIST_LIMIT, NAMESPACE_FIELD, StoreConfig, VectorStore};
pub use traits::{
    CollectionInfo, FieldMatch, Point, PointFilter, ScoredPoint, StoredPoint, VectorEngine,
};
