//! Retrieval services.
//!
//! Services orchestrate the vector store and provide multi-namespace search.

// Allow cast precision loss for latency metrics.
#![allow(clippy::cast_precision_loss)]

mod backend_factory;
pub mod dedup;
pub mod rerank;
mod retriever;
mod stats;

pub use backend_factory::BackendFactory;
pub use dedup::{Deduplicator, fingerprint};
pub use rerank::rerank;
pub use retriever::{NamespaceRetriever, RetrieverConfig};
pub use stats::{FailureReason, RetrievalStats};
