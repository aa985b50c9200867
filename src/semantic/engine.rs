//! Tiered embedding engine.
//!
//! Tries each configured tier in priority order (sentence model, word
//! vectors, hashed bag-of-words) and returns the first usable vector,
//! fitted to the store dimension and normalized to unit length.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::config::EmbeddingConfig;
use crate::semantic::embeddings::{EmbeddingError, EmbeddingTier, SentenceEmbedder, TextEmbedder};
use crate::semantic::hashing::HashEmbedder;
use crate::semantic::preprocess::{join_field, truncate_chars};
use crate::semantic::similarity::{fit_dimensions, normalize};
use crate::semantic::types::VectorMetadata;
use crate::semantic::word_vectors::WordEmbedder;

pub const DESCRIPTION_WEIGHT: f32 = 1.0;
pub const KEYWORDS_WEIGHT: f32 = 0.8;
pub const TRANSCRIPT_WEIGHT: f32 = 0.5;
pub const PEOPLE_WEIGHT: f32 = 0.7;

/// Transcripts are cut to this many characters before embedding.
pub const TRANSCRIPT_MAX_CHARS: usize = 500;

/// Converts text into normalized fixed-length vectors.
///
/// Shared across threads behind an `Arc`; each tier loads its model once, on
/// first use.
pub struct EmbeddingEngine {
    tiers: Vec<Box<dyn TextEmbedder>>,
    dimensions: usize,
    pool: Option<rayon::ThreadPool>,
}

impl EmbeddingEngine {
    /// Build an engine from explicit tiers.
    ///
    /// Tiers are sorted by priority. A hashed tier is appended when missing so
    /// that non-empty text always yields a vector.
    pub fn new(mut tiers: Vec<Box<dyn TextEmbedder>>, dimensions: usize) -> Self {
        tiers.sort_by_key(|t| t.tier());
        if !tiers.iter().any(|t| t.tier() == EmbeddingTier::Hashed) {
            tiers.push(Box::new(HashEmbedder::new(dimensions)));
        }

        Self {
            tiers,
            dimensions,
            pool: None,
        }
    }

    /// Engine using exactly `tiers`, with no hashed tier appended.
    #[cfg(test)]
    pub(crate) fn without_fallback(tiers: Vec<Box<dyn TextEmbedder>>, dimensions: usize) -> Self {
        Self {
            tiers,
            dimensions,
            pool: None,
        }
    }

    /// Engine with only the deterministic hashed tier.
    pub fn hashed_only(dimensions: usize) -> Self {
        Self::new(Vec::new(), dimensions)
    }

    /// Build the tier chain described by `config`.
    ///
    /// Model files are cached under `base_path`.
    pub fn from_config(
        config: &EmbeddingConfig,
        base_path: &Path,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let mut tiers: Vec<Box<dyn TextEmbedder>> = Vec::new();

        if config.sentence_model_enabled {
            let sentence =
                SentenceEmbedder::new(&config.sentence_model, base_path.to_path_buf(), dimensions)?;
            tiers.push(Box::new(sentence));
        }

        if let Some(path) = &config.word_vectors_path {
            tiers.push(Box::new(WordEmbedder::new(path.clone(), dimensions)));
        }

        let mut engine = Self::new(tiers, dimensions);

        if let Some(threads) = config.parallelism() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
            engine.pool = Some(pool);
        }

        Ok(engine)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Tiers in the order they are tried.
    pub fn tiers(&self) -> Vec<EmbeddingTier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    /// Hex SHA256 over the identities of all tiers.
    ///
    /// Persisted alongside stored vectors to detect a model change.
    pub fn model_id(&self) -> String {
        let mut hasher = Sha256::new();
        for (i, tier) in self.tiers.iter().enumerate() {
            if i > 0 {
                hasher.update(b"|");
            }
            hasher.update(tier.identity().as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Embed text with the first tier that succeeds.
    ///
    /// Returns `None` for empty or whitespace-only input.
    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_with_tier(text).map(|(_, vector)| vector)
    }

    /// Which tier would embed `text`.
    pub fn tier_for(&self, text: &str) -> Option<EmbeddingTier> {
        self.embed_with_tier(text).map(|(tier, _)| tier)
    }

    /// Embed text and report the tier that produced the vector.
    pub fn embed_with_tier(&self, text: &str) -> Option<(EmbeddingTier, Vec<f32>)> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        for embedder in &self.tiers {
            let tier = embedder.tier();
            let raw = match embedder.embed(text) {
                Ok(raw) => raw,
                Err(e) => {
                    log::debug!("tier={} outcome=skip err={}", tier, e);
                    continue;
                }
            };

            let Some(mut vector) = fit_dimensions(raw, self.dimensions) else {
                log::warn!("tier={} outcome=skip err=vector wider than {}", tier, self.dimensions);
                continue;
            };

            if normalize(&mut vector) || tier == EmbeddingTier::Hashed {
                return Some((tier, vector));
            }
            log::debug!("tier={} outcome=skip err=zero-norm vector", tier);
        }

        None
    }

    /// Embed each text independently, preserving input order.
    pub fn embed_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Option<Vec<f32>>> {
        let run = || {
            texts
                .par_iter()
                .map(|text| self.embed(text.as_ref()))
                .collect::<Vec<_>>()
        };

        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Weighted combination of the embeddings of up to four media fields.
    ///
    /// Fields that are absent, blank, or fail to embed contribute nothing.
    /// Returns `None` when no field contributes.
    pub fn embed_media_metadata(
        &self,
        description: &str,
        keywords: &[String],
        transcript: Option<&str>,
        people: Option<&[String]>,
    ) -> Option<Vec<f32>> {
        let keywords = join_field(keywords);
        let transcript = transcript.map(|t| truncate_chars(t.trim(), TRANSCRIPT_MAX_CHARS));
        let people = people.and_then(join_field);

        let fields = [
            (Some(description), DESCRIPTION_WEIGHT),
            (keywords.as_deref(), KEYWORDS_WEIGHT),
            (transcript, TRANSCRIPT_WEIGHT),
            (people.as_deref(), PEOPLE_WEIGHT),
        ];

        let mut combined = vec![0.0f32; self.dimensions];
        let mut total_weight = 0.0f32;

        for (text, weight) in fields {
            let Some(vector) = text.and_then(|t| self.embed(t)) else {
                continue;
            };
            for (acc, value) in combined.iter_mut().zip(&vector) {
                *acc += value * weight;
            }
            total_weight += weight;
        }

        if total_weight == 0.0 {
            return None;
        }

        combined.iter_mut().for_each(|x| *x /= total_weight);
        normalize(&mut combined);
        Some(combined)
    }

    /// `embed_media_metadata` over the fields of stored metadata.
    pub fn embed_metadata(&self, metadata: &VectorMetadata) -> Option<Vec<f32>> {
        self.embed_media_metadata(
            &metadata.description,
            &metadata.keywords,
            metadata.transcript.as_deref(),
            metadata.people.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::similarity::{cosine_similarity, l2_norm};
    use crate::semantic::EMBEDDING_DIMENSIONS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> EmbeddingEngine {
        EmbeddingEngine::hashed_only(EMBEDDING_DIMENSIONS)
    }

    /// Tier that always fails, counting how often it was asked.
    struct FailingTier {
        calls: AtomicUsize,
    }

    impl TextEmbedder for FailingTier {
        fn tier(&self) -> EmbeddingTier {
            EmbeddingTier::Sentence
        }
        fn identity(&self) -> String {
            "failing".to_string()
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::Unavailable("failing".to_string()))
        }
    }

    /// Tier returning a fixed short vector.
    struct FixedTier(Vec<f32>);

    impl TextEmbedder for FixedTier {
        fn tier(&self) -> EmbeddingTier {
            EmbeddingTier::Sentence
        }
        fn identity(&self) -> String {
            "fixed".to_string()
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_empty_input_has_no_embedding() {
        let engine = engine();
        assert!(engine.embed("").is_none());
        assert!(engine.embed("   \n\t").is_none());
    }

    #[test]
    fn test_unit_norm() {
        let engine = engine();
        for text in ["a beach at sunset", "snowy mountain peak", "hello world", "東京都 タワー"] {
            let v = engine.embed(text).unwrap();
            assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
            assert!((l2_norm(&v) - 1.0).abs() < 1e-5, "norm of {:?}", text);
        }
    }

    #[test]
    fn test_deterministic() {
        let engine = engine();
        let a = engine.embed("Golden Gate bridge in fog").unwrap();
        let b = engine.embed("Golden Gate bridge in fog").unwrap();
        assert_eq!(a, b);

        let other = EmbeddingEngine::hashed_only(EMBEDDING_DIMENSIONS);
        assert_eq!(a, other.embed("Golden Gate bridge in fog").unwrap());
    }

    #[test]
    fn test_no_signal_yields_zero_vector() {
        let engine = engine();
        let v = engine.embed("a b c").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_falls_through_failing_tier() {
        let engine = EmbeddingEngine::new(
            vec![Box::new(FailingTier {
                calls: AtomicUsize::new(0),
            })],
            EMBEDDING_DIMENSIONS,
        );
        assert_eq!(engine.tiers(), vec![EmbeddingTier::Sentence, EmbeddingTier::Hashed]);
        assert_eq!(engine.tier_for("mountain"), Some(EmbeddingTier::Hashed));
    }

    #[test]
    fn test_first_tier_is_fitted_and_normalized() {
        let engine = EmbeddingEngine::new(vec![Box::new(FixedTier(vec![3.0, 4.0]))], 4);
        let (tier, v) = engine.embed_with_tier("anything").unwrap();
        assert_eq!(tier, EmbeddingTier::Sentence);
        assert_eq!(v.len(), 4);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_from_model_falls_through() {
        let engine = EmbeddingEngine::new(vec![Box::new(FixedTier(vec![0.0, 0.0]))], 8);
        assert_eq!(engine.tier_for("mountain"), Some(EmbeddingTier::Hashed));
    }

    #[test]
    fn test_too_wide_vector_falls_through() {
        let engine = EmbeddingEngine::new(vec![Box::new(FixedTier(vec![1.0; 16]))], 8);
        assert_eq!(engine.tier_for("mountain"), Some(EmbeddingTier::Hashed));
    }

    #[test]
    fn test_batch_preserves_order() {
        let engine = engine();
        let texts = vec!["mountain peak", "", "beach sunset"];
        let batch = engine.embed_batch(&texts);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], engine.embed("mountain peak"));
        assert!(batch[1].is_none());
        assert_eq!(batch[2], engine.embed("beach sunset"));
    }

    #[test]
    fn test_batch_empty() {
        let texts: Vec<String> = vec![];
        assert!(engine().embed_batch(&texts).is_empty());
    }

    #[test]
    fn test_media_metadata_all_empty() {
        let engine = engine();
        assert!(engine.embed_media_metadata("", &[], None, None).is_none());
        assert!(engine
            .embed_media_metadata("  ", &["".to_string()], Some(" "), Some(Vec::new().as_slice()))
            .is_none());
    }

    #[test]
    fn test_media_metadata_single_field_equals_embed() {
        let engine = engine();
        let combined = engine
            .embed_media_metadata("snowy mountain peak", &[], None, None)
            .unwrap();
        let direct = engine.embed("snowy mountain peak").unwrap();
        for (a, b) in combined.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_media_metadata_weighting() {
        let engine = engine();
        let keywords = vec!["mountain".to_string()];
        let combined = engine
            .embed_media_metadata("beach sunset", &keywords, None, None)
            .unwrap();

        assert!((l2_norm(&combined) - 1.0).abs() < 1e-5);

        let description = engine.embed("beach sunset").unwrap();
        let keyword = engine.embed("mountain").unwrap();
        // description weighs 1.0 against keywords 0.8
        assert!(
            cosine_similarity(&combined, &description) > cosine_similarity(&combined, &keyword)
        );
        assert!(cosine_similarity(&combined, &keyword) > 0.0);
    }

    #[test]
    fn test_media_metadata_transcript_is_truncated() {
        let engine = engine();
        let head = "lighthouse ".repeat(45); // 495 chars
        let transcript = format!("{}{}", head, "volcano ".repeat(50));

        let truncated = engine
            .embed_media_metadata("", &[], Some(&transcript), None)
            .unwrap();
        let expected = engine.embed(truncate_chars(&transcript, TRANSCRIPT_MAX_CHARS)).unwrap();
        let volcano = engine.embed("volcano").unwrap();

        for (a, b) in truncated.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6);
        }
        // "volca" is all that survives of the tail, not a full "volcano" token
        assert_eq!(cosine_similarity(&truncated, &volcano), 0.0);
    }

    #[test]
    fn test_model_id_depends_on_tiers() {
        let a = EmbeddingEngine::hashed_only(512);
        let b = EmbeddingEngine::hashed_only(256);
        assert_eq!(a.model_id(), EmbeddingEngine::hashed_only(512).model_id());
        assert_ne!(a.model_id(), b.model_id());
        assert_eq!(a.model_id().len(), 64);
    }

    #[test]
    fn test_from_config_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = dir.path().join("glove.txt");
        std::fs::write(&vectors, "beach 1.0 0.0\nsunset 0.0 1.0\n").unwrap();

        let config = EmbeddingConfig {
            sentence_model_enabled: false,
            word_vectors_path: Some(vectors),
            embedding_parallelism: "2".to_string(),
            ..Default::default()
        };
        let engine = EmbeddingEngine::from_config(&config, dir.path(), EMBEDDING_DIMENSIONS).unwrap();

        assert_eq!(engine.tiers(), vec![EmbeddingTier::WordVectors, EmbeddingTier::Hashed]);
        assert_eq!(engine.tier_for("beach"), Some(EmbeddingTier::WordVectors));
        assert_eq!(engine.tier_for("mountain"), Some(EmbeddingTier::Hashed));

        let batch = engine.embed_batch(&["beach", "mountain"]);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.as_ref().is_some_and(|v| v.len() == EMBEDDING_DIMENSIONS)));
    }

    #[test]
    fn test_from_config_rejects_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            sentence_model: "gpt-embeddings".to_string(),
            ..Default::default()
        };

        let result = EmbeddingEngine::from_config(&config, dir.path(), EMBEDDING_DIMENSIONS);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }
}
