//! Multi-namespace retrieval.
//!
//! [`NamespaceRetriever`] answers a query against several namespaces of one
//! [`VectorStore`]. It embeds the query once, searches the targeted
//! namespaces concurrently on a bounded pool, drops duplicates, and reranks
//! the merged candidates with a small bonus for the preferred namespace.
//!
//! # Strategies
//!
//! | Strategy | Namespaces searched | Boosted namespace |
//! |----------|---------------------|-------------------|
//! | Primary only | the primary | none |
//! | Fallback | the primary, then the others if its results are weak | the primary |
//! | Comprehensive | all configured | the default namespace |
//!
//! # Failure Isolation
//!
//! Each namespace search runs in its own task under a timeout. An error,
//! panic, or timeout in one namespace is logged, counted, and contributes no
//! results; the rest of the call proceeds. Only a failure to embed the query
//! fails the call.
//!
//! Panic isolation relies on unwinding. The release profile sets
//! `panic = "abort"`, so there a panicking engine call ends the process.

use super::dedup::{DEFAULT_DEDUP_WINDOW, Deduplicator};
use super::rerank::{DEFAULT_MAX_SCORE, DEFAULT_PRIMARY_BOOST, rerank};
use super::stats::{FailureReason, RetrievalStats};
use crate::models::{ScoredRecord, SearchResult, SearchStrategy, StatsSnapshot};
use crate::storage::VectorStore;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

/// Retriever configuration.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Namespaces available for search, in order.
    pub namespaces: Vec<String>,
    /// Namespace used by the primary-only and fallback strategies and boosted
    /// by the comprehensive strategy.
    pub default_namespace: String,
    /// Upper bound on concurrent namespace searches per call.
    pub max_workers: usize,
    /// Content characters that contribute to a dedup fingerprint.
    pub dedup_window: usize,
    /// Score bonus for the preferred namespace when reranking.
    pub primary_boost: f32,
    /// Cap on boosted scores.
    pub max_score: f32,
    /// Timeout for a single namespace search (and for embedding the query).
    pub task_timeout: Duration,
    /// Fallback fires when the best primary score is below this.
    pub fallback_threshold: f32,
    /// Fallback fires when the primary namespace returns fewer results than this.
    pub min_primary_results: usize,
}

impl RetrieverConfig {
    /// Default per-task timeout.
    pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default fallback threshold.
    pub const DEFAULT_FALLBACK_THRESHOLD: f32 = 0.65;

    /// Default minimum number of primary results.
    pub const DEFAULT_MIN_PRIMARY_RESULTS: usize = 4;

    /// Default worker cap.
    pub const DEFAULT_MAX_WORKERS: usize = 4;

    /// Creates a configuration with default tuning.
    #[must_use]
    pub fn new(namespaces: Vec<String>, default_namespace: impl Into<String>) -> Self {
        Self {
            namespaces,
            default_namespace: default_namespace.into(),
            max_workers: Self::DEFAULT_MAX_WORKERS,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            primary_boost: DEFAULT_PRIMARY_BOOST,
            max_score: DEFAULT_MAX_SCORE,
            task_timeout: Self::DEFAULT_TASK_TIMEOUT,
            fallback_threshold: Self::DEFAULT_FALLBACK_THRESHOLD,
            min_primary_results: Self::DEFAULT_MIN_PRIMARY_RESULTS,
        }
    }

    /// Sets the worker cap.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the dedup window.
    #[must_use]
    pub const fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// Sets the rerank bonus.
    #[must_use]
    pub const fn with_primary_boost(mut self, boost: f32) -> Self {
        self.primary_boost = boost;
        self
    }

    /// Sets the per-task timeout.
    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Sets the fallback thresholds used by [`NamespaceRetriever::search`].
    #[must_use]
    pub const fn with_fallback(mut self, threshold: f32, min_primary_results: usize) -> Self {
        self.fallback_threshold = threshold;
        self.min_primary_results = min_primary_results;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if there are no namespaces, a
    /// namespace is blank or repeated, the default namespace is not
    /// configured, or `max_workers`/`task_timeout` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.namespaces.is_empty() {
            return Err(Error::Configuration(
                "at least one namespace is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for namespace in &self.namespaces {
            if namespace.trim().is_empty() {
                return Err(Error::Configuration("namespace names must not be blank".to_string()));
            }
            if !seen.insert(namespace.as_str()) {
                return Err(Error::Configuration(format!(
                    "namespace '{namespace}' is listed twice"
                )));
            }
        }
        if !seen.contains(self.default_namespace.as_str()) {
            return Err(Error::Configuration(format!(
                "default namespace '{}' is not one of the configured namespaces",
                self.default_namespace
            )));
        }
        if self.max_workers == 0 {
            return Err(Error::Configuration("max_workers must be at least 1".to_string()));
        }
        if self.task_timeout.is_zero() {
            return Err(Error::Configuration("task_timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Orchestrates concurrent retrieval across namespaces.
///
/// Cheap to share: wrap in an `Arc` and call from any number of tasks.
pub struct NamespaceRetriever {
    store: Arc<VectorStore>,
    config: RetrieverConfig,
    stats: RetrievalStats,
}

impl NamespaceRetriever {
    /// Creates a retriever over a shared store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid.
    pub fn new(store: Arc<VectorStore>, config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            stats: RetrievalStats::new(),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Runs a query with the given strategy, using the default namespace as
    /// primary and the configured fallback thresholds.
    ///
    /// For the comprehensive strategy `limit` is per namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingFailed`] if the query cannot be embedded.
    pub async fn search(
        &self,
        query: &str,
        strategy: SearchStrategy,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let primary = self.config.default_namespace.clone();
        match strategy {
            SearchStrategy::PrimaryOnly => self.search_primary_only(query, &primary, limit).await,
            SearchStrategy::Fallback => {
                self.search_with_fallback(
                    query,
                    &primary,
                    limit,
                    self.config.fallback_threshold,
                    self.config.min_primary_results,
                )
                .await
            },
            SearchStrategy::Comprehensive => self.search_all_namespaces(query, limit).await,
        }
    }

    /// Searches one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingFailed`] if the query cannot be embedded.
    #[instrument(skip(self, query), fields(strategy = "primary_only"))]
    pub async fn search_primary_only(
        &self,
        query: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        self.stats.record_search(SearchStrategy::PrimaryOnly);
        let start = Instant::now();

        let Some(vector) = self.embed_query(query).await? else {
            return Ok(Vec::new());
        };
        let results = self
            .fan_out(&vector, std::slice::from_ref(&namespace.to_string()), limit)
            .await;

        record_duration(SearchStrategy::PrimaryOnly, start);
        Ok(results)
    }

    /// Searches `primary_namespace`, widening to the other configured
    /// namespaces when its results are weak.
    ///
    /// Fallback fires when the primary namespace returns fewer than
    /// `min_primary_results` results, none at all, or a best score below
    /// `fallback_threshold`. The remaining `limit - primary count` slots are
    /// then filled from the other namespaces, skipping duplicates of primary
    /// results. The combined list is reranked with a bonus for the primary
    /// namespace and truncated to `limit`. Primary results are never dropped
    /// in favor of fallback results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingFailed`] if the query cannot be embedded.
    #[instrument(skip(self, query), fields(strategy = "fallback"))]
    pub async fn search_with_fallback(
        &self,
        query: &str,
        primary_namespace: &str,
        limit: usize,
        fallback_threshold: f32,
        min_primary_results: usize,
    ) -> Result<Vec<SearchResult>> {
        self.stats.record_search(SearchStrategy::Fallback);
        let start = Instant::now();

        let Some(vector) = self.embed_query(query).await? else {
            return Ok(Vec::new());
        };

        let primary = self
            .fan_out(
                &vector,
                std::slice::from_ref(&primary_namespace.to_string()),
                limit,
            )
            .await;

        if !needs_fallback(&primary, fallback_threshold, min_primary_results) {
            tracing::debug!(
                namespace = primary_namespace,
                results = primary.len(),
                "Primary namespace sufficient"
            );
            record_duration(SearchStrategy::Fallback, start);
            return Ok(primary);
        }

        self.stats.record_fallback();
        let remaining = limit.saturating_sub(primary.len());
        tracing::debug!(
            namespace = primary_namespace,
            primary_results = primary.len(),
            remaining,
            "Falling back to other namespaces"
        );
        if remaining == 0 {
            record_duration(SearchStrategy::Fallback, start);
            return Ok(primary);
        }

        let others: Vec<String> = self
            .config
            .namespaces
            .iter()
            .filter(|ns| ns.as_str() != primary_namespace)
            .cloned()
            .collect();
        let candidates = self.fan_out(&vector, &others, remaining).await;

        let mut dedup = Deduplicator::new(self.config.dedup_window);
        dedup.hold(&primary);
        let mut fallback = dedup.filter(candidates);
        self.stats.record_duplicates(dedup.removed());

        fallback.sort_by(|a, b| b.score.total_cmp(&a.score));
        fallback.truncate(remaining);

        let mut combined = primary;
        combined.extend(fallback);
        rerank(
            &mut combined,
            primary_namespace,
            self.config.primary_boost,
            self.config.max_score,
        );
        combined.truncate(limit);

        record_duration(SearchStrategy::Fallback, start);
        Ok(combined)
    }

    /// Searches every configured namespace, removes duplicates, and reranks
    /// with a bonus for the default namespace. Returns at most
    /// `limit_per_namespace × namespace count` results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingFailed`] if the query cannot be embedded.
    #[instrument(skip(self, query), fields(strategy = "comprehensive"))]
    pub async fn search_all_namespaces(
        &self,
        query: &str,
        limit_per_namespace: usize,
    ) -> Result<Vec<SearchResult>> {
        self.stats.record_search(SearchStrategy::Comprehensive);
        let start = Instant::now();

        let Some(vector) = self.embed_query(query).await? else {
            return Ok(Vec::new());
        };

        let candidates = self
            .fan_out(&vector, &self.config.namespaces, limit_per_namespace)
            .await;

        let mut dedup = Deduplicator::new(self.config.dedup_window);
        let mut results = dedup.filter(candidates);
        self.stats.record_duplicates(dedup.removed());

        rerank(
            &mut results,
            &self.config.default_namespace,
            self.config.primary_boost,
            self.config.max_score,
        );
        results.truncate(limit_per_namespace.saturating_mul(self.config.namespaces.len()));

        record_duration(SearchStrategy::Comprehensive, start);
        Ok(results)
    }

    /// Returns the diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(&self.config.namespaces, &self.config.default_namespace)
    }

    /// Zeroes the diagnostic counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Embeds the query off the async executor. `Ok(None)` means the query
    /// was blank and the call should return nothing.
    async fn embed_query(&self, query: &str) -> Result<Option<Arc<Vec<f32>>>> {
        if query.trim().is_empty() {
            tracing::debug!("Blank query, returning no results");
            return Ok(None);
        }

        let store = Arc::clone(&self.store);
        let owned = query.to_string();
        let handle = tokio::task::spawn_blocking(move || store.embed_query(&owned));

        match tokio::time::timeout(self.config.task_timeout, handle).await {
            Ok(Ok(Ok(vector))) => Ok(Some(Arc::new(vector))),
            Ok(Ok(Err(e))) => Err(Error::EmbeddingFailed {
                cause: e.to_string(),
            }),
            Ok(Err(join_err)) => Err(Error::EmbeddingFailed {
                cause: join_err.to_string(),
            }),
            Err(_) => Err(Error::EmbeddingFailed {
                cause: format!(
                    "timed out after {}ms",
                    self.config.task_timeout.as_millis()
                ),
            }),
        }
    }

    /// Searches each namespace in its own task and waits for all of them.
    ///
    /// Results are returned grouped in the order of `namespaces`, each group
    /// best first. Failed namespaces contribute nothing.
    async fn fan_out(
        &self,
        vector: &Arc<Vec<f32>>,
        namespaces: &[String],
        limit: usize,
    ) -> Vec<SearchResult> {
        if namespaces.is_empty() || limit == 0 {
            return Vec::new();
        }

        let workers = self.config.max_workers.min(namespaces.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let timeout = self.config.task_timeout;
        let mut tasks = JoinSet::new();
        let mut task_namespaces = HashMap::new();

        for (index, namespace) in namespaces.iter().enumerate() {
            let task = search_namespace(
                Arc::clone(&self.store),
                Arc::clone(&semaphore),
                Arc::clone(vector),
                namespace.clone(),
                limit,
                timeout,
            );
            let handle = tasks.spawn(async move { (index, task.await) });
            task_namespaces.insert(handle.id(), namespace.as_str());
        }

        let mut grouped: Vec<Vec<SearchResult>> = vec![Vec::new(); namespaces.len()];
        while let Some(joined) = tasks.join_next_with_id().await {
            let (namespace, outcome) = match joined {
                Ok((_, (index, outcome))) => (namespaces[index].as_str(), outcome.map(|r| (index, r))),
                Err(join_err) => (
                    task_namespaces.get(&join_err.id()).copied().unwrap_or("unknown"),
                    Err(TaskFailure {
                        reason: FailureReason::Panic,
                        cause: join_err.to_string(),
                    }),
                ),
            };

            match outcome {
                Ok((index, records)) => {
                    grouped[index] = records
                        .into_iter()
                        .map(|(key, payload, score)| {
                            SearchResult::new(key, payload, score, namespace)
                        })
                        .collect();
                },
                Err(failure) => {
                    let err = Error::NamespaceSearchFailed {
                        namespace: namespace.to_string(),
                        cause: failure.cause,
                    };
                    tracing::warn!(
                        namespace,
                        reason = failure.reason.as_str(),
                        error = %err,
                        "Namespace search contributed no results"
                    );
                    self.stats.record_namespace_failure(namespace, failure.reason);
                },
            }
        }

        grouped.into_iter().flatten().collect()
    }
}

#[derive(Debug)]
struct TaskFailure {
    reason: FailureReason,
    cause: String,
}

/// One namespace search: wait for a worker slot, then run the blocking store
/// call under the timeout. A timed-out call keeps running on the blocking pool
/// but its permit is released and its result is discarded.
async fn search_namespace(
    store: Arc<VectorStore>,
    semaphore: Arc<Semaphore>,
    vector: Arc<Vec<f32>>,
    namespace: String,
    limit: usize,
    timeout: Duration,
) -> std::result::Result<Vec<ScoredRecord>, TaskFailure> {
    let _permit = semaphore.acquire_owned().await.map_err(|e| TaskFailure {
        reason: FailureReason::Error,
        cause: e.to_string(),
    })?;

    let handle =
        tokio::task::spawn_blocking(move || store.search_vector(&namespace, &vector, limit));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(records))) => Ok(records),
        Ok(Ok(Err(e))) => Err(TaskFailure {
            reason: FailureReason::Error,
            cause: e.to_string(),
        }),
        Ok(Err(join_err)) => Err(TaskFailure {
            reason: if join_err.is_panic() {
                FailureReason::Panic
            } else {
                FailureReason::Error
            },
            cause: join_err.to_string(),
        }),
        Err(_) => Err(TaskFailure {
            reason: FailureReason::Timeout,
            cause: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

/// Fallback fires on too few results, no results, or a weak best score.
fn needs_fallback(primary: &[SearchResult], threshold: f32, min_results: usize) -> bool {
    if primary.len() < min_results {
        return true;
    }
    primary
        .iter()
        .map(|r| r.score)
        .reduce(f32::max)
        .is_none_or(|best| best < threshold)
}

fn record_duration(strategy: SearchStrategy, start: Instant) {
    metrics::histogram!("retrieval_search_duration_ms", "strategy" => strategy.as_str())
        .record(start.elapsed().as_secs_f64() * 1000.0);
}
