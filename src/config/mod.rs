//! Configuration management.
//!
//! Configuration is read from a TOML file and then overridden from the
//! environment. Every section and every field is optional.
//!
//! ```toml
//! [store]
//! backend = "qdrant"
//! qdrant_url = "http://localhost:6333"
//!
//! [embedding]
//! provider = "openai"
//! dimensions = 768
//!
//! [retriever]
//! namespaces = ["marketing", "menu", "branches"]
//! default_namespace = "marketing"
//! ```

use crate::services::RetrieverConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for nsrecall.
#[derive(Debug, Clone, Default)]
pub struct NsrecallConfig {
    /// Vector store settings.
    pub store: StoreSettings,
    /// Embedding settings.
    pub embedding: EmbeddingSettings,
    /// Retriever settings.
    pub retriever: RetrieverSettings,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Storage engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// In-process engine, optionally persisted to a JSON file.
    #[default]
    Memory,
    /// Qdrant server over REST.
    Qdrant,
}

impl StorageBackend {
    /// Parses a backend name. Unknown names select the memory engine.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Self::Qdrant,
            _ => Self::Memory,
        }
    }

    /// Returns the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Qdrant => "qdrant",
        }
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingProvider {
    /// Deterministic token-hash embeddings.
    #[default]
    Hash,
    /// `OpenAI`-compatible embeddings API.
    OpenAi,
}

impl EmbeddingProvider {
    /// Parses a provider name. Unknown names select the hash embedder.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" | "open-ai" => Self::OpenAi,
            _ => Self::Hash,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Storage engine.
    pub backend: StorageBackend,
    /// Collection name.
    pub collection: String,
    /// Expected vector length; checked against the embedder when set.
    pub dimensions: Option<usize>,
    /// Persistence file for the memory engine.
    pub data_path: Option<PathBuf>,
    /// Qdrant base URL.
    pub qdrant_url: String,
    /// Qdrant API key.
    pub qdrant_api_key: Option<String>,
    /// Engine request timeout.
    pub timeout_ms: u64,
    /// Index the namespace payload field on collection creation.
    pub namespace_index: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            collection: "nsrecall_store".to_string(),
            dimensions: None,
            data_path: None,
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_api_key: None,
            timeout_ms: 5_000,
            namespace_index: true,
        }
    }
}

/// Embedding settings.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Provider.
    pub provider: EmbeddingProvider,
    /// Model name (`OpenAI` provider only).
    pub model: String,
    /// Vector length.
    pub dimensions: usize,
    /// API endpoint (`OpenAI` provider only).
    pub endpoint: String,
    /// API key (`OpenAI` provider only).
    pub api_key: Option<String>,
    /// Maximum concurrent embedding calls.
    pub max_concurrent: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model: "text-embedding-3-small".to_string(),
            dimensions: crate::embedding::DEFAULT_DIMENSIONS,
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            max_concurrent: 4,
        }
    }
}

/// Retriever settings.
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    /// Namespaces to search.
    pub namespaces: Vec<String>,
    /// Preferred namespace; defaults to the first configured namespace.
    pub default_namespace: Option<String>,
    /// Worker cap per call.
    pub max_workers: usize,
    /// Dedup fingerprint window in characters.
    pub dedup_window: usize,
    /// Rerank bonus for the preferred namespace.
    pub primary_boost: f32,
    /// Per-namespace task timeout.
    pub task_timeout_ms: u64,
    /// Fallback score threshold.
    pub fallback_threshold: f32,
    /// Fallback minimum primary result count.
    pub min_primary_results: usize,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            default_namespace: None,
            max_workers: RetrieverConfig::DEFAULT_MAX_WORKERS,
            dedup_window: crate::services::dedup::DEFAULT_DEDUP_WINDOW,
            primary_boost: crate::services::rerank::DEFAULT_PRIMARY_BOOST,
            task_timeout_ms: 10_000,
            fallback_threshold: RetrieverConfig::DEFAULT_FALLBACK_THRESHOLD,
            min_primary_results: RetrieverConfig::DEFAULT_MIN_PRIMARY_RESULTS,
        }
    }
}

impl RetrieverSettings {
    /// Builds a validated retriever configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no namespaces are configured or the
    /// resulting configuration is invalid.
    pub fn to_retriever_config(&self) -> Result<RetrieverConfig> {
        let default_namespace = self
            .default_namespace
            .clone()
            .or_else(|| self.namespaces.first().cloned())
            .ok_or_else(|| {
                Error::Configuration("retriever.namespaces must not be empty".to_string())
            })?;

        let config = RetrieverConfig::new(self.namespaces.clone(), default_namespace)
            .with_max_workers(self.max_workers)
            .with_dedup_window(self.dedup_window)
            .with_primary_boost(self.primary_boost)
            .with_task_timeout(Duration::from_millis(self.task_timeout_ms))
            .with_fallback(self.fallback_threshold, self.min_primary_results);
        config.validate()?;
        Ok(config)
    }
}

/// Observability settings from the config file.
#[derive(Debug, Clone, Default)]
pub struct ObservabilitySettings {
    /// `[logging]` section.
    pub logging: Option<LoggingSettings>,
    /// `[metrics]` section.
    pub metrics: Option<MetricsSettings>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `nsrecall=debug`.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<PathBuf>,
}

/// `[metrics]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Whether to install the Prometheus recorder.
    pub enabled: Option<bool>,
    /// HTTP listener port.
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// `[store]` section.
    pub store: Option<ConfigFileStore>,
    /// `[embedding]` section.
    pub embedding: Option<ConfigFileEmbedding>,
    /// `[retriever]` section.
    pub retriever: Option<ConfigFileRetriever>,
    /// `[logging]` section.
    pub logging: Option<LoggingSettings>,
    /// `[metrics]` section.
    pub metrics: Option<MetricsSettings>,
}

/// Store section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStore {
    /// Backend name.
    pub backend: Option<String>,
    /// Collection name.
    pub collection: Option<String>,
    /// Vector length.
    pub dimensions: Option<usize>,
    /// Memory engine persistence file.
    pub data_path: Option<String>,
    /// Qdrant URL.
    pub qdrant_url: Option<String>,
    /// Qdrant API key.
    pub qdrant_api_key: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Namespace index.
    pub namespace_index: Option<bool>,
}

/// Embedding section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEmbedding {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Vector length.
    pub dimensions: Option<usize>,
    /// API endpoint.
    pub endpoint: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Concurrent call cap.
    pub max_concurrent: Option<usize>,
}

/// Retriever section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetriever {
    /// Namespaces.
    pub namespaces: Option<Vec<String>>,
    /// Default namespace.
    pub default_namespace: Option<String>,
    /// Worker cap.
    pub max_workers: Option<usize>,
    /// Dedup window.
    pub dedup_window: Option<usize>,
    /// Rerank bonus.
    pub primary_boost: Option<f32>,
    /// Task timeout.
    pub task_timeout_ms: Option<u64>,
    /// Fallback threshold.
    pub fallback_threshold: Option<f32>,
    /// Fallback minimum count.
    pub min_primary_results: Option<usize>,
}

impl NsrecallConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::parse(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/nsrecall/` on macOS)
    /// 2. XDG config dir (`~/.config/nsrecall/`)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("nsrecall").join("config.toml");
        if platform_config.exists()
            && let Ok(config) = Self::load_from_file(&platform_config)
        {
            return config;
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("nsrecall")
            .join("config.toml");
        if xdg_config.exists()
            && let Ok(config) = Self::load_from_file(&xdg_config)
        {
            return config;
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `NsrecallConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(store) = file.store {
            let settings = &mut config.store;
            if let Some(backend) = store.backend {
                settings.backend = StorageBackend::parse(&backend);
            }
            if let Some(collection) = store.collection {
                settings.collection = collection;
            }
            settings.dimensions = store.dimensions.or(settings.dimensions);
            if let Some(path) = store.data_path {
                settings.data_path = Some(PathBuf::from(path));
            }
            if let Some(url) = store.qdrant_url {
                settings.qdrant_url = url;
            }
            settings.qdrant_api_key = store.qdrant_api_key.or(settings.qdrant_api_key.take());
            if let Some(timeout_ms) = store.timeout_ms {
                settings.timeout_ms = timeout_ms;
            }
            if let Some(v) = store.namespace_index {
                settings.namespace_index = v;
            }
        }

        if let Some(embedding) = file.embedding {
            let settings = &mut config.embedding;
            if let Some(provider) = embedding.provider {
                settings.provider = EmbeddingProvider::parse(&provider);
            }
            if let Some(model) = embedding.model {
                settings.model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                settings.dimensions = dimensions;
            }
            if let Some(endpoint) = embedding.endpoint {
                settings.endpoint = endpoint;
            }
            settings.api_key = embedding.api_key.or(settings.api_key.take());
            if let Some(max) = embedding.max_concurrent {
                settings.max_concurrent = max;
            }
        }

        if let Some(retriever) = file.retriever {
            let settings = &mut config.retriever;
            if let Some(namespaces) = retriever.namespaces {
                settings.namespaces = namespaces;
            }
            settings.default_namespace = retriever
                .default_namespace
                .or(settings.default_namespace.take());
            if let Some(v) = retriever.max_workers {
                settings.max_workers = v;
            }
            if let Some(v) = retriever.dedup_window {
                settings.dedup_window = v;
            }
            if let Some(v) = retriever.primary_boost {
                settings.primary_boost = v;
            }
            if let Some(v) = retriever.task_timeout_ms {
                settings.task_timeout_ms = v;
            }
            if let Some(v) = retriever.fallback_threshold {
                settings.fallback_threshold = v;
            }
            if let Some(v) = retriever.min_primary_results {
                settings.min_primary_results = v;
            }
        }

        config.observability = ObservabilitySettings {
            logging: file.logging,
            metrics: file.metrics,
        };

        config
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Setting |
    /// |----------|---------|
    /// | `NSRECALL_STORE_BACKEND` | `store.backend` |
    /// | `NSRECALL_COLLECTION` | `store.collection` |
    /// | `NSRECALL_DATA_PATH` | `store.data_path` |
    /// | `NSRECALL_QDRANT_URL`, `QDRANT_URL` | `store.qdrant_url` |
    /// | `NSRECALL_QDRANT_API_KEY`, `QDRANT_API_KEY` | `store.qdrant_api_key` |
    /// | `NSRECALL_EMBEDDING_PROVIDER` | `embedding.provider` |
    /// | `NSRECALL_EMBEDDING_MODEL` | `embedding.model` |
    /// | `NSRECALL_EMBEDDING_DIMENSIONS` | `embedding.dimensions` |
    /// | `OPENAI_API_KEY` | `embedding.api_key` |
    /// | `NSRECALL_NAMESPACES` | `retriever.namespaces` (comma separated) |
    /// | `NSRECALL_DEFAULT_NAMESPACE` | `retriever.default_namespace` |
    ///
    /// Logging and metrics overrides are applied by the observability module.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_string("NSRECALL_STORE_BACKEND") {
            self.store.backend = StorageBackend::parse(&v);
        }
        if let Some(v) = env_string("NSRECALL_COLLECTION") {
            self.store.collection = v;
        }
        if let Some(v) = env_string("NSRECALL_DATA_PATH") {
            self.store.data_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("NSRECALL_QDRANT_URL").or_else(|| env_string("QDRANT_URL")) {
            self.store.qdrant_url = v;
        }
        if let Some(v) =
            env_string("NSRECALL_QDRANT_API_KEY").or_else(|| env_string("QDRANT_API_KEY"))
        {
            self.store.qdrant_api_key = Some(v);
        }
        if let Some(v) = env_string("NSRECALL_EMBEDDING_PROVIDER") {
            self.embedding.provider = EmbeddingProvider::parse(&v);
        }
        if let Some(v) = env_string("NSRECALL_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = env_string("NSRECALL_EMBEDDING_DIMENSIONS")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.embedding.dimensions = parsed;
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = env_string("OPENAI_API_KEY");
        }
        if let Some(v) = env_string("NSRECALL_NAMESPACES") {
            self.retriever.namespaces = parse_namespace_list(&v);
        }
        if let Some(v) = env_string("NSRECALL_DEFAULT_NAMESPACE") {
            self.retriever.default_namespace = Some(v);
        }
        self
    }
}

/// Splits a comma-separated namespace list, dropping blanks.
fn parse_namespace_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
