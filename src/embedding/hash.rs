//! Deterministic token-hash embedder.
//!
//! Produces pseudo-embeddings without a model: each token is hashed and its
//! hash spread across a few dimensions, then the vector is normalized. Texts
//! that share tokens land close together, which is enough for local
//! development, tests, and offline deployments. There is no semantic quality.

use super::{Embedder, normalize};
use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Token-hash embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Upper bound on tokens considered per text.
    const MAX_TOKENS: usize = 1000;

    /// Creates an embedder producing vectors of the given length.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split_whitespace()
            .map(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|token| !token.is_empty())
            .take(Self::MAX_TOKENS)
    }

    fn distribute_hash(&self, embedding: &mut [f32], hash: u64) {
        for j in 0..4 {
            let idx = ((hash >> (j * 16)) as usize) % self.dimensions;
            let sign = if (hash >> (j + 60)) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(super::DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let mut seen = 0usize;

        for token in Self::tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            self.distribute_hash(&mut embedding, hasher.finish());
            seen += 1;
        }

        if seen == 0 {
            return Err(Error::InvalidInput(
                "cannot embed text without tokens".to_string(),
            ));
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_embed_has_configured_dimensions() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.embed("red shoes").unwrap().len(), 64);
        assert_eq!(HashEmbedder::default().dimensions(), 768);
    }

    #[test]
    fn test_embed_is_deterministic() {
        let embedder = HashEmbedder::new(128);
        assert_eq!(
            embedder.embed("opening hours").unwrap(),
            embedder.embed("opening hours").unwrap()
        );
    }

    #[test]
    fn test_embed_ignores_case_and_punctuation() {
        let embedder = HashEmbedder::new(128);
        assert_eq!(
            embedder.embed("Red, Shoes!").unwrap(),
            embedder.embed("red shoes").unwrap()
        );
    }

    #[test]
    fn test_shared_tokens_score_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed("red shoes").unwrap();
        let near = embedder.embed("red shoes on sale").unwrap();
        let far = embedder.embed("branch opening hours").unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_embed_blank_text_fails() {
        let embedder = HashEmbedder::new(32);
        assert!(embedder.embed("").is_err());
        assert!(embedder.embed("   ").is_err());
        assert!(embedder.embed("!!! ...").is_err());
    }
}
