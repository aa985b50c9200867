//! Embedding tiers and the fastembed sentence model.
//!
//! Provides:
//! - `TextEmbedder`, the interface every fallback tier implements
//! - `SentenceEmbedder`, a lazily loaded fastembed `TextEmbedding`
//!
//! Tiers return raw vectors; fitting to the store dimension and
//! normalization happen in the engine.

use fastembed::{InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Embedding tier unavailable: {0}")]
    Unavailable(String),

    #[error("Model produces {got}-dimensional vectors, at most {max} are supported")]
    DimensionTooLarge { max: usize, got: usize },

    #[error("No token in the text could be embedded")]
    NoSignal,
}

/// Which strategy produced a vector, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EmbeddingTier {
    Sentence,
    WordVectors,
    Hashed,
}

impl fmt::Display for EmbeddingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmbeddingTier::Sentence => "sentence",
            EmbeddingTier::WordVectors => "word-vectors",
            EmbeddingTier::Hashed => "hashed",
        };
        f.write_str(name)
    }
}

/// One embedding strategy. Implementations must be safe to share across threads.
pub trait TextEmbedder: Send + Sync {
    fn tier(&self) -> EmbeddingTier;

    /// Stable description of the model behind this tier, used to fingerprint
    /// persisted vectors.
    fn identity(&self) -> String;

    /// Embed already-trimmed, non-empty text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Loaded fastembed model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
struct LoadedModel {
    model: Mutex<TextEmbedding>,
    dimensions: usize,
}

/// Sentence-level embedding model backed by fastembed.
///
/// The model is downloaded and loaded on first use. A failed load is logged
/// once and the tier stays unavailable for the lifetime of the embedder.
pub struct SentenceEmbedder {
    model_name: String,
    cache_dir: PathBuf,
    max_dimensions: usize,
    model: OnceCell<Option<LoadedModel>>,
}

impl SentenceEmbedder {
    /// Create a sentence embedder for `model_name`.
    ///
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    /// Models producing more than `max_dimensions` values are refused at load.
    pub fn new(model_name: &str, cache_dir: PathBuf, max_dimensions: usize) -> Result<Self, EmbeddingError> {
        Self::parse_model_name(model_name)?;
        Ok(Self {
            model_name: model_name.to_string(),
            cache_dir,
            max_dimensions,
            model: OnceCell::new(),
        })
    }

    /// Get the model name
    pub fn name(&self) -> &str {
        &self.model_name
    }

    /// Embedding dimensions of the loaded model, if it has been loaded.
    pub fn dimensions(&self) -> Option<usize> {
        self.model.get().and_then(|m| m.as_ref()).map(|m| m.dimensions)
    }

    fn loaded(&self) -> Option<&LoadedModel> {
        self.model
            .get_or_init(|| match self.load() {
                Ok(model) => {
                    log::info!(
                        "Loaded sentence model '{}' ({} dimensions)",
                        self.model_name,
                        model.dimensions
                    );
                    Some(model)
                }
                Err(e) => {
                    log::warn!("Sentence model '{}' unavailable: {}", self.model_name, e);
                    None
                }
            })
            .as_ref()
    }

    fn load(&self) -> Result<LoadedModel, EmbeddingError> {
        let model_enum = Self::parse_model_name(&self.model_name)?;

        let models_dir = self.cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;
        if dimensions > self.max_dimensions {
            return Err(EmbeddingError::DimensionTooLarge {
                max: self.max_dimensions,
                got: dimensions,
            });
        }

        Ok(LoadedModel {
            model: Mutex::new(model),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum.
    ///
    /// Only models whose output fits the store dimension are listed.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
            }
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl TextEmbedder for SentenceEmbedder {
    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::Sentence
    }

    fn identity(&self) -> String {
        format!("sentence:{}", self.model_name.to_lowercase())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let loaded = self
            .loaded()
            .ok_or_else(|| EmbeddingError::Unavailable(self.model_name.clone()))?;

        let mut model = loaded.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = SentenceEmbedder::new("nonexistent-model", temp_dir.path().to_path_buf(), 512);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_wide_models_are_not_accepted() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = SentenceEmbedder::new("bge-base-en-v1.5", temp_dir.path().to_path_buf(), 512);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_identity_is_case_insensitive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = SentenceEmbedder::new("All-MiniLM-L6-v2", temp_dir.path().to_path_buf(), 512).unwrap();
        let b = SentenceEmbedder::new("all-minilm-l6-v2", temp_dir.path().to_path_buf(), 512).unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.tier(), EmbeddingTier::Sentence);
        assert!(a.dimensions().is_none());
    }

    #[test]
    fn test_tier_order() {
        assert!(EmbeddingTier::Sentence < EmbeddingTier::WordVectors);
        assert!(EmbeddingTier::WordVectors < EmbeddingTier::Hashed);
        assert_eq!(EmbeddingTier::Hashed.to_string(), "hashed");
    }

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_embedding_generation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = SentenceEmbedder::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), 512).unwrap();

        let embedding = model.embed("Hello, world!").unwrap();
        assert_eq!(embedding.len(), 384);
        assert_eq!(model.dimensions(), Some(384));
    }
}
