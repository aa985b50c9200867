//! Deterministic hashed bag-of-words embedder.
//!
//! Terminal fallback tier: needs no model, never fails, and maps the same
//! text to the same vector on every run and platform (CRC-32 bucketing).

use crate::semantic::embeddings::{EmbeddingError, EmbeddingTier, TextEmbedder};
use crate::semantic::preprocess::tokenize;

pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Bucket a token lands in.
    pub fn bucket(&self, token: &str) -> usize {
        crc32fast::hash(token.as_bytes()) as usize % self.dimensions
    }

    /// Raw token counts per bucket. All zeros when no token survives tokenization.
    pub fn counts(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            counts[self.bucket(&token)] += 1.0;
        }
        counts
    }
}

impl TextEmbedder for HashEmbedder {
    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::Hashed
    }

    fn identity(&self) -> String {
        format!("hashed:crc32:{}", self.dimensions)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.counts(text))
    }
}
