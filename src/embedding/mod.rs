//! Embedding generation.
//!
//! Provides the [`Embedder`] seam plus a deterministic offline embedder, an
//! `OpenAI`-compatible HTTP embedder, and a concurrency-limiting wrapper.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation for hash index calculations on 32-bit platforms.
#![allow(clippy::cast_possible_truncation)]

mod bulkhead;
mod hash;
mod openai;

pub use bulkhead::{BulkheadEmbedder, EmbeddingBulkheadConfig};
pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

use crate::Result;

/// Default embedding dimensionality for new collections.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for vectors of different lengths, empty vectors, or
/// zero-norm vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Normalizes a vector to unit length in place. Zero vectors are left alone.
pub fn normalize(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 {
        return;
    }
    let inv_norm = norm_sq.sqrt().recip();
    for v in embedding.iter_mut() {
        *v *= inv_norm;
    }
}
