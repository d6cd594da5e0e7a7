//! Concurrency limit for embedding calls.
//!
//! Each namespace fan-out embeds its query once, but several top-level
//! retrievals and writes can still embed at the same time. Remote providers
//! rate-limit and local models are CPU bound, so [`BulkheadEmbedder`] caps the
//! number of in-flight calls with a semaphore.
//!
//! ```rust,ignore
//! use nsrecall::embedding::{BulkheadEmbedder, EmbeddingBulkheadConfig, OpenAiEmbedder};
//!
//! let embedder = BulkheadEmbedder::new(
//!     OpenAiEmbedder::new(768),
//!     EmbeddingBulkheadConfig::from_env().with_max_concurrent(4),
//! );
//! ```

use super::Embedder;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Configuration for the embedding bulkhead.
#[derive(Debug, Clone)]
pub struct EmbeddingBulkheadConfig {
    /// Maximum concurrent embedding calls.
    pub max_concurrent: usize,
    /// Timeout for acquiring a permit in milliseconds (0 = two minute cap).
    pub acquire_timeout_ms: u64,
    /// Reject immediately when no permit is free.
    pub fail_fast: bool,
}

impl Default for EmbeddingBulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            acquire_timeout_ms: 30_000,
            fail_fast: false,
        }
    }
}

impl EmbeddingBulkheadConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `NSRECALL_EMBEDDING_BULKHEAD_MAX_CONCURRENT` | Max concurrent calls | 4 |
    /// | `NSRECALL_EMBEDDING_BULKHEAD_ACQUIRE_TIMEOUT_MS` | Permit timeout | 30000 |
    /// | `NSRECALL_EMBEDDING_BULKHEAD_FAIL_FAST` | Fail when full | false |
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("NSRECALL_EMBEDDING_BULKHEAD_MAX_CONCURRENT")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.max_concurrent = parsed.max(1);
        }
        if let Ok(v) = std::env::var("NSRECALL_EMBEDDING_BULKHEAD_ACQUIRE_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.acquire_timeout_ms = parsed;
        }
        if let Ok(v) = std::env::var("NSRECALL_EMBEDDING_BULKHEAD_FAIL_FAST") {
            self.fail_fast = v.eq_ignore_ascii_case("true") || v == "1";
        }
        self
    }

    /// Sets the maximum concurrent calls.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the acquire timeout in milliseconds.
    #[must_use]
    pub const fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Sets whether to fail fast when the bulkhead is full.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Embedder wrapper that limits concurrent calls.
pub struct BulkheadEmbedder<E: Embedder> {
    inner: E,
    config: EmbeddingBulkheadConfig,
    semaphore: Arc<Semaphore>,
}

impl<E: Embedder> BulkheadEmbedder<E> {
    /// Wraps an embedder.
    #[must_use]
    pub fn new(inner: E, config: EmbeddingBulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner,
            config,
            semaphore,
        }
    }

    /// Returns the number of free permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    // Callers are synchronous and may run on blocking threads, so the permit is
    // polled rather than awaited.
    fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        metrics::gauge!("embedding_bulkhead_available_permits")
            .set(self.semaphore.available_permits() as f64);

        let timeout = Duration::from_millis(match self.config.acquire_timeout_ms {
            0 => 120_000,
            ms => ms,
        });
        let start = Instant::now();

        loop {
            if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                metrics::counter!("embedding_bulkhead_permits_acquired_total").increment(1);
                return Ok(permit);
            }

            let reason = if self.config.fail_fast {
                Some("full")
            } else if start.elapsed() >= timeout {
                Some("timeout")
            } else {
                None
            };

            if let Some(reason) = reason {
                metrics::counter!("embedding_bulkhead_rejections_total", "reason" => reason)
                    .increment(1);
                return Err(Error::OperationFailed {
                    operation: "embedding_bulkhead_acquire".to_string(),
                    cause: format!(
                        "embedding bulkhead {reason} (max concurrent: {})",
                        self.config.max_concurrent.max(1)
                    ),
                });
            }

            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl<E: Embedder> Embedder for BulkheadEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self.acquire()?;
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let _permit = self.acquire()?;
        self.inner.embed_batch(texts)
    }
}
