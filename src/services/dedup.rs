//! Fingerprint-based deduplication of search candidates.
//!
//! The same document is often stored in more than one namespace. Two results
//! are treated as duplicates when their keys match and their contents agree
//! on the first `window` characters.

use crate::models::SearchResult;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Default number of content characters that contribute to a fingerprint.
pub const DEFAULT_DEDUP_WINDOW: usize = 200;

/// Computes the fingerprint of a result: the SHA256 hex digest of
/// `key + ":" + first window chars of content`.
///
/// The window counts characters, not bytes, so multi-byte text is never split.
///
/// ```rust
/// use nsrecall::services::dedup::fingerprint;
///
/// let a = fingerprint("faq-1", "Opening hours are 9 to 5", 200);
/// assert_eq!(a.len(), 64);
/// assert_eq!(a, fingerprint("faq-1", "Opening hours are 9 to 5", 200));
/// assert_ne!(a, fingerprint("faq-2", "Opening hours are 9 to 5", 200));
/// ```
#[must_use]
pub fn fingerprint(key: &str, content: &str, window: usize) -> String {
    let end = content
        .char_indices()
        .nth(window)
        .map_or(content.len(), |(i, _)| i);

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b":");
    hasher.update(&content.as_bytes()[..end]);
    hex::encode(hasher.finalize())
}

/// Set of held fingerprints for one retrieval call.
#[derive(Debug)]
pub struct Deduplicator {
    window: usize,
    seen: HashSet<String>,
    removed: u64,
}

impl Deduplicator {
    /// Creates an empty deduplicator.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window,
            seen: HashSet::new(),
            removed: 0,
        }
    }

    /// Holds the fingerprints of results that are already accepted.
    pub fn hold(&mut self, accepted: &[SearchResult]) {
        for result in accepted {
            self.seen
                .insert(fingerprint(&result.chunk_id, result.content(), self.window));
        }
    }

    /// Returns `true` and holds the fingerprint if the result is new.
    pub fn admit(&mut self, result: &SearchResult) -> bool {
        let fresh = self
            .seen
            .insert(fingerprint(&result.chunk_id, result.content(), self.window));
        if !fresh {
            self.removed += 1;
        }
        fresh
    }

    /// Keeps the first occurrence of each fingerprint, preserving order.
    pub fn filter(&mut self, candidates: Vec<SearchResult>) -> Vec<SearchResult> {
        candidates.into_iter().filter(|r| self.admit(r)).collect()
    }

    /// Number of candidates dropped so far.
    #[must_use]
    pub const fn removed(&self) -> u64 {
        self.removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payload;

    fn result(key: &str, content: &str, namespace: &str) -> SearchResult {
        SearchResult::new(key, Payload::new(content), 0.5, namespace)
    }

    #[test]
    fn test_fingerprint_only_uses_window() {
        let base = "x".repeat(200);
        let a = format!("{base}tail one");
        let b = format!("{base}different tail");
        assert_eq!(fingerprint("k", &a, 200), fingerprint("k", &b, 200));
        assert_ne!(fingerprint("k", &a, 201), fingerprint("k", &b, 201));
    }

    #[test]
    fn test_fingerprint_counts_characters() {
        let content = "phở bò tái chín";
        // Would panic on a byte slice inside a multi-byte character.
        let short = fingerprint("k", content, 2);
        assert_eq!(short, fingerprint("k", "phZZZ", 2));
        assert_eq!(fingerprint("k", content, 1000), fingerprint("k", content, 100));
    }

    #[test]
    fn test_fingerprint_matches_sha256_of_joined_text() {
        let mut hasher = Sha256::new();
        hasher.update(b"key:content");
        assert_eq!(
            fingerprint("key", "content", DEFAULT_DEDUP_WINDOW),
            hex::encode(hasher.finalize())
        );
    }

    #[test]
    fn test_filter_drops_duplicates_across_namespaces() {
        let mut dedup = Deduplicator::new(DEFAULT_DEDUP_WINDOW);
        let kept = dedup.filter(vec![
            result("k", "same", "a"),
            result("k", "same", "b"),
            result("k", "other", "b"),
            result("k2", "same", "b"),
        ]);
        let namespaces: Vec<_> = kept.iter().map(|r| r.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["a", "b", "b"]);
        assert_eq!(dedup.removed(), 1);
    }

    #[test]
    fn test_held_results_win() {
        let mut dedup = Deduplicator::new(DEFAULT_DEDUP_WINDOW);
        dedup.hold(&[result("k", "same", "primary")]);
        let kept = dedup.filter(vec![result("k", "same", "other"), result("j", "x", "other")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "j");
        assert_eq!(dedup.removed(), 1);
    }
}
