//! Search results, strategies, and retrieval diagnostics.

use super::Payload;
use crate::Error;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A single retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Record key within its namespace.
    pub chunk_id: String,
    /// The record's payload.
    pub content_dict: Payload,
    /// Raw similarity score (higher is better). Never includes rerank boosts.
    pub score: f32,
    /// Namespace the result was retrieved from.
    pub namespace: String,
}

impl SearchResult {
    /// Creates a new search result.
    #[must_use]
    pub fn new(
        chunk_id: impl Into<String>,
        content_dict: Payload,
        score: f32,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            content_dict,
            score,
            namespace: namespace.into(),
        }
    }

    /// Returns the payload's content text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content_dict.content
    }
}

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Search the default namespace only.
    PrimaryOnly,
    /// Search the primary namespace, widening to the others when results are weak (default).
    #[default]
    Fallback,
    /// Search every namespace at once.
    Comprehensive,
}

impl SearchStrategy {
    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryOnly => "primary_only",
            Self::Fallback => "fallback",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "primary_only" | "primary" => Ok(Self::PrimaryOnly),
            "fallback" => Ok(Self::Fallback),
            "comprehensive" | "all" => Ok(Self::Comprehensive),
            other => Err(Error::InvalidInput(format!(
                "unknown search strategy '{other}'"
            ))),
        }
    }
}

/// Point-in-time view of the retriever's diagnostic counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Top-level searches started.
    pub total_searches: u64,
    /// Fallback searches that widened past the primary namespace.
    pub fallback_triggered: u64,
    /// Candidates dropped as duplicates.
    pub duplicates_removed: u64,
    /// Namespace searches that returned an error or panicked.
    pub namespace_failures: u64,
    /// Namespace searches abandoned after the per-task timeout.
    pub namespace_timeouts: u64,
    /// Configured namespaces, in order.
    pub namespaces: Vec<String>,
    /// Namespace used by the primary-only and comprehensive strategies.
    pub default_namespace: String,
}
