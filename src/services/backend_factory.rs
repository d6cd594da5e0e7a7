//! Backend factory.
//!
//! Builds the embedder, storage engine, store, and retriever from
//! [`NsrecallConfig`].
//!
//! ```text
//! BackendFactory
//!   ├── create_embedder() → Arc<dyn Embedder>         (bulkhead-wrapped)
//!   ├── create_engine()   → Arc<dyn VectorEngine>     (breaker-wrapped)
//!   ├── create_store()    → Arc<VectorStore>
//!   └── create_retriever() → NamespaceRetriever
//! ```

use super::NamespaceRetriever;
use crate::Result;
use crate::config::{
    EmbeddingProvider, EmbeddingSettings, NsrecallConfig, StorageBackend, StoreSettings,
};
use crate::embedding::{
    BulkheadEmbedder, Embedder, EmbeddingBulkheadConfig, HashEmbedder, OpenAiEmbedder,
};
use crate::storage::{
    EngineResilienceConfig, MemoryEngine, QdrantEngine, ResilientEngine, StoreConfig,
    VectorEngine, VectorStore,
};
use std::sync::Arc;

/// Factory for creating configured components.
pub struct BackendFactory;

impl BackendFactory {
    /// Creates the embedder, limited by the embedding bulkhead.
    #[must_use]
    pub fn create_embedder(settings: &EmbeddingSettings) -> Arc<dyn Embedder> {
        let bulkhead = EmbeddingBulkheadConfig::default()
            .with_max_concurrent(settings.max_concurrent.max(1))
            .with_env_overrides();

        match settings.provider {
            EmbeddingProvider::Hash => Arc::new(BulkheadEmbedder::new(
                HashEmbedder::new(settings.dimensions),
                bulkhead,
            )),
            EmbeddingProvider::OpenAi => {
                let mut embedder = OpenAiEmbedder::new(settings.dimensions)
                    .with_endpoint(&settings.endpoint)
                    .with_model(&settings.model);
                if let Some(key) = settings.api_key.as_deref() {
                    embedder = embedder.with_api_key(key);
                }
                Arc::new(BulkheadEmbedder::new(embedder, bulkhead))
            },
        }
    }

    /// Creates the storage engine, wrapped in a circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory engine's persistence file exists but
    /// cannot be loaded.
    pub fn create_engine(settings: &StoreSettings) -> Result<Arc<dyn VectorEngine>> {
        let resilience = EngineResilienceConfig::from_env();

        let engine: Arc<dyn VectorEngine> = match settings.backend {
            StorageBackend::Memory => {
                let engine = match &settings.data_path {
                    Some(path) => MemoryEngine::with_path(path)?,
                    None => MemoryEngine::new(),
                };
                Arc::new(ResilientEngine::new(engine, &resilience))
            },
            StorageBackend::Qdrant => {
                let mut engine =
                    QdrantEngine::new(&settings.qdrant_url).with_timeout_ms(settings.timeout_ms);
                if let Some(key) = settings.qdrant_api_key.as_deref() {
                    engine = engine.with_api_key(key);
                }
                Arc::new(ResilientEngine::new(engine, &resilience))
            },
        };

        tracing::debug!(backend = settings.backend.as_str(), "Created storage engine");
        Ok(engine)
    }

    /// Creates the store, opening or creating its collection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DimensionMismatch`] if the embedder and the
    /// collection disagree on vector length, or any engine error.
    pub fn create_store(config: &NsrecallConfig) -> Result<Arc<VectorStore>> {
        let embedder = Self::create_embedder(&config.embedding);
        let engine = Self::create_engine(&config.store)?;

        let mut store_config = StoreConfig::default()
            .with_collection(&config.store.collection)
            .with_namespace_index(config.store.namespace_index);
        if let Some(dimensions) = config.store.dimensions {
            store_config = store_config.with_dimensions(dimensions);
        }

        Ok(Arc::new(VectorStore::new(engine, embedder, store_config)?))
    }

    /// Creates a retriever over an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the retriever settings are invalid.
    pub fn create_retriever(
        store: Arc<VectorStore>,
        config: &NsrecallConfig,
    ) -> Result<NamespaceRetriever> {
        NamespaceRetriever::new(store, config.retriever.to_retriever_config()?)
    }
}
