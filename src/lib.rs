//! # nsrecall
//!
//! Namespace-partitioned vector storage with concurrent multi-strategy retrieval.
//!
//! Records live in a single vector collection and are partitioned by a
//! `namespace` payload field. The [`VectorStore`] provides key/value access
//! and per-namespace similarity search; the [`NamespaceRetriever`] fans a
//! query out across namespaces, deduplicates the candidates, and reranks them
//! with a bias toward a preferred namespace.
//!
//! ## Features
//!
//! - Deterministic record identity (`uuid` v5 of `namespace:key`)
//! - Pluggable engines: in-memory brute force or Qdrant over REST
//! - Three retrieval strategies: primary only, fallback, comprehensive
//! - Per-namespace failure isolation with bounded concurrency and timeouts
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nsrecall::{HashEmbedder, MemoryEngine, NamespaceRetriever, RetrieverConfig, VectorStore};
//! use nsrecall::storage::StoreConfig;
//!
//! let store = Arc::new(VectorStore::new(
//!     Arc::new(MemoryEngine::new()),
//!     Arc::new(HashEmbedder::new(384)),
//!     StoreConfig::default().with_dimensions(384),
//! )?);
//! let retriever = NamespaceRetriever::new(
//!     store,
//!     RetrieverConfig::new(vec!["menu".into(), "branches".into()], "menu"),
//! )?;
//! let results = retriever.search_with_fallback("opening hours", "branches", 12, 0.65, 4).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::NsrecallConfig;
pub use embedding::{BulkheadEmbedder, Embedder, HashEmbedder, OpenAiEmbedder};
pub use models::{Payload, RecordId, SearchResult, SearchStrategy, StatsSnapshot};
pub use services::{NamespaceRetriever, RetrieverConfig};
pub use storage::{MemoryEngine, QdrantEngine, VectorEngine, VectorStore};

/// Error type for nsrecall operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty namespace or key, vector of the wrong length |
/// | `OperationFailed` | Engine, HTTP, filesystem, or serialization failures |
/// | `DimensionMismatch` | Embedder and collection disagree on vector length |
/// | `Configuration` | Invalid retriever or store settings |
/// | `EmbeddingFailed` | The query that started a retrieval could not be embedded |
/// | `NamespaceSearchFailed` | A single namespace search failed inside a fan-out |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - The storage engine rejects or fails a request
    /// - An HTTP call to Qdrant or an embedding API fails
    /// - Persisting the in-memory engine to disk fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The embedder's vector length differs from the collection's.
    ///
    /// Fatal at store construction; the store refuses to start.
    #[error("dimension mismatch: collection expects {expected}, embedder produces {actual}")]
    DimensionMismatch {
        /// Dimensionality of the collection.
        expected: usize,
        /// Dimensionality of the embedder.
        actual: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The initiating query embedding could not be computed.
    #[error("embedding failed: {cause}")]
    EmbeddingFailed {
        /// The underlying cause.
        cause: String,
    },

    /// A single namespace search failed, timed out, or panicked.
    ///
    /// Produced at the fan-out task boundary, where it is logged and counted.
    #[error("search in namespace '{namespace}' failed: {cause}")]
    NamespaceSearchFailed {
        /// The namespace that was being searched.
        namespace: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for nsrecall operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: collection expects 768, embedder produces 384"
        );

        let err = Error::NamespaceSearchFailed {
            namespace: "menu".to_string(),
            cause: "timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "search in namespace 'menu' failed: timed out"
        );
    }
}
