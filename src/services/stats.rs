//! Retrieval diagnostics.
//!
//! Counters are plain atomics updated with relaxed ordering; concurrent
//! readers may observe a snapshot that is slightly behind. Every update is
//! mirrored to the `metrics` facade.

use crate::models::{SearchStrategy, StatsSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a namespace task produced no results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The search returned an error.
    Error,
    /// The search panicked.
    Panic,
    /// The search exceeded the per-task timeout.
    Timeout,
}

impl FailureReason {
    /// Returns the reason as a metrics label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Panic => "panic",
            Self::Timeout => "timeout",
        }
    }
}

/// Shared diagnostic counters.
#[derive(Debug, Default)]
pub struct RetrievalStats {
    total_searches: AtomicU64,
    fallback_triggered: AtomicU64,
    duplicates_removed: AtomicU64,
    namespace_failures: AtomicU64,
    namespace_timeouts: AtomicU64,
}

impl RetrievalStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a top-level search.
    pub fn record_search(&self, strategy: SearchStrategy) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("retrieval_searches_total", "strategy" => strategy.as_str())
            .increment(1);
    }

    /// Records that a fallback search widened past its primary namespace.
    pub fn record_fallback(&self) {
        self.fallback_triggered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("retrieval_fallback_triggered_total").increment(1);
    }

    /// Records dropped duplicates.
    pub fn record_duplicates(&self, removed: u64) {
        if removed == 0 {
            return;
        }
        self.duplicates_removed.fetch_add(removed, Ordering::Relaxed);
        metrics::counter!("retrieval_duplicates_removed_total").increment(removed);
    }

    /// Records a namespace task that contributed nothing.
    pub fn record_namespace_failure(&self, namespace: &str, reason: FailureReason) {
        match reason {
            FailureReason::Timeout => self.namespace_timeouts.fetch_add(1, Ordering::Relaxed),
            FailureReason::Error | FailureReason::Panic => {
                self.namespace_failures.fetch_add(1, Ordering::Relaxed)
            },
        };
        metrics::counter!(
            "retrieval_namespace_failures_total",
            "namespace" => namespace.to_string(),
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self, namespaces: &[String], default_namespace: &str) -> StatsSnapshot {
        StatsSnapshot {
            total_searches: self.total_searches.load(Ordering::Relaxed),
            fallback_triggered: self.fallback_triggered.load(Ordering::Relaxed),
            duplicates_removed: self.duplicates_removed.load(Ordering::Relaxed),
            namespace_failures: self.namespace_failures.load(Ordering::Relaxed),
            namespace_timeouts: self.namespace_timeouts.load(Ordering::Relaxed),
            namespaces: namespaces.to_vec(),
            default_namespace: default_namespace.to_string(),
        }
    }

    /// Zeroes all counters.
    pub fn reset(&self) {
        for counter in [
            &self.total_searches,
            &self.fallback_triggered,
            &self.duplicates_removed,
            &self.namespace_failures,
            &self.namespace_timeouts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_accumulate_and_reset() {
        let stats = RetrievalStats::new();
        stats.record_search(SearchStrategy::Fallback);
        stats.record_search(SearchStrategy::Comprehensive);
        stats.record_fallback();
        stats.record_duplicates(3);
        stats.record_duplicates(0);
        stats.record_namespace_failure("a", FailureReason::Error);
        stats.record_namespace_failure("a", FailureReason::Panic);
        stats.record_namespace_failure("b", FailureReason::Timeout);

        let snapshot = stats.snapshot(&["a".to_string(), "b".to_string()], "a");
        assert_eq!(snapshot.total_searches, 2);
        assert_eq!(snapshot.fallback_triggered, 1);
        assert_eq!(snapshot.duplicates_removed, 3);
        assert_eq!(snapshot.namespace_failures, 2);
        assert_eq!(snapshot.namespace_timeouts, 1);
        assert_eq!(snapshot.namespaces, vec!["a", "b"]);
        assert_eq!(snapshot.default_namespace, "a");

        stats.reset();
        let snapshot = stats.snapshot(&[], "a");
        assert_eq!(snapshot.total_searches, 0);
        assert_eq!(snapshot.duplicates_removed, 0);
        assert_eq!(snapshot.namespace_timeouts, 0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(RetrievalStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_search(SearchStrategy::PrimaryOnly);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot(&[], "").total_searches, 8000);
    }
}
