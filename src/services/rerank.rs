//! Namespace-biased reranking.

use crate::models::SearchResult;

/// Default bonus added to results from the preferred namespace.
pub const DEFAULT_PRIMARY_BOOST: f32 = 0.05;

/// Default cap on boosted scores.
pub const DEFAULT_MAX_SCORE: f32 = 1.0;

/// Orders results by `min(score + boost, max_score)` descending, where the
/// boost applies only to results from `boosted_namespace`.
///
/// The sort is stable, so results with equal adjusted scores keep their input
/// order. Returned scores are the untouched raw scores.
pub fn rerank(results: &mut Vec<SearchResult>, boosted_namespace: &str, boost: f32, max_score: f32) {
    let mut keyed: Vec<(f32, SearchResult)> = results
        .drain(..)
        .map(|r| (adjusted_score(&r, boosted_namespace, boost, max_score), r))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    results.extend(keyed.into_iter().map(|(_, r)| r));
}

/// Score used for ordering a single result.
#[must_use]
pub fn adjusted_score(result: &SearchResult, boosted_namespace: &str, boost: f32, max_score: f32) -> f32 {
    let bonus = if result.namespace == boosted_namespace {
        boost
    } else {
        0.0
    };
    (result.score + bonus).min(max_score)
}
