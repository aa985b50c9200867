use homedir::my_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::semantic::hybrid::{DEFAULT_KEYWORD_WEIGHT, DEFAULT_SEMANTIC_WEIGHT, HybridWeights};
use crate::semantic::{DEFAULT_MODEL, DEFAULT_THRESHOLD, DEFAULT_TOP_K};

const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_STORE_FILE: &str = "vectors.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Embedding engine settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Use the sentence model tier
    #[serde(default = "default_true")]
    pub sentence_model_enabled: bool,

    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_sentence_model")]
    pub sentence_model: String,

    /// Word vector table in GloVe text format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_vectors_path: Option<PathBuf>,

    /// Parallelism for embedding generation: "auto" or a positive integer
    #[serde(default = "default_embedding_parallelism")]
    pub embedding_parallelism: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            sentence_model_enabled: true,
            sentence_model: DEFAULT_MODEL.to_string(),
            word_vectors_path: None,
            embedding_parallelism: "auto".to_string(),
        }
    }
}

impl EmbeddingConfig {
    /// Thread count for batch embedding, `None` for rayon's default.
    pub fn parallelism(&self) -> Option<usize> {
        match self.embedding_parallelism.as_str() {
            "auto" => None,
            n => n.parse::<usize>().ok().filter(|n| *n > 0),
        }
    }
}

/// Vector store and search settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store document, relative to the base directory
    #[serde(default = "default_store_file")]
    pub file_name: String,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Default similarity threshold [0.0, 1.0]
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_STORE_FILE.to_string(),
            default_top_k: DEFAULT_TOP_K,
            default_threshold: DEFAULT_THRESHOLD,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
        }
    }
}

impl StoreConfig {
    pub fn weights(&self) -> HybridWeights {
        HybridWeights::new(self.keyword_weight, self.semantic_weight)
    }
}

fn default_true() -> bool {
    true
}

fn default_sentence_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_parallelism() -> String {
    "auto".to_string()
}

fn default_store_file() -> String {
    DEFAULT_STORE_FILE.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_keyword_weight() -> f32 {
    DEFAULT_KEYWORD_WEIGHT
}

fn default_semantic_weight() -> f32 {
    DEFAULT_SEMANTIC_WEIGHT
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

/// Base directory: `SEMSTORE_BASE_PATH`, or `~/.local/share/semstore`.
pub fn default_base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("SEMSTORE_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .map_err(|_| ConfigError::NoHomeDir)?
        .ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".local").join("share").join("semstore"))
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let store = &self.store;
        if !(0.0..=1.0).contains(&store.default_threshold) {
            return Err(ConfigError::Invalid(format!(
                "store.default_threshold must be between 0.0 and 1.0, got {}",
                store.default_threshold
            )));
        }

        if store.keyword_weight < 0.0 || store.semantic_weight < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "store weights must not be negative, got keyword {} and semantic {}",
                store.keyword_weight, store.semantic_weight
            )));
        }

        if store.default_top_k == 0 {
            return Err(ConfigError::Invalid(
                "store.default_top_k must be greater than 0".to_string(),
            ));
        }

        if store.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("store.file_name must not be empty".to_string()));
        }

        // validate embedding_parallelism: "auto" or positive integer
        let emb = &self.embedding;
        if emb.embedding_parallelism != "auto" && emb.parallelism().is_none() {
            return Err(ConfigError::Invalid(format!(
                "embedding.embedding_parallelism must be 'auto' or a positive integer, got '{}'",
                emb.embedding_parallelism
            )));
        }

        Ok(())
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&default_base_path()?)
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            let mut config = Self::default();
            config.base_path = base_path.to_path_buf();
            config.save()?;
            return Ok(config);
        }

        let config_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::info!("Upgrading {}", path.display());
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.base_path).map_err(|source| ConfigError::Io {
            path: self.base_path.clone(),
            source,
        })?;

        let path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(self)?;
        std::fs::write(&path, config_str).map_err(|source| ConfigError::Io { path, source })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_with(dir.path()).unwrap();

        assert!(dir.path().join("config.yaml").exists());
        assert_eq!(config.embedding, EmbeddingConfig::default());
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.base_path(), dir.path());
    }

    #[test]
    fn test_missing_keys_get_defaults_and_resave() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "embedding:\n  sentence_model_enabled: false\n",
        )
        .unwrap();

        let config = Config::load_with(dir.path()).unwrap();

        assert!(!config.embedding.sentence_model_enabled);
        assert_eq!(config.store.default_top_k, 10);
        assert_eq!(config.store.file_name, "vectors.json");

        let saved = std::fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(saved.contains("default_threshold"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "store:\n  default_threshold: 1.5\n").unwrap();

        let result = Config::load_with(dir.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "store: [unclosed").unwrap();

        let result = Config::load_with(dir.path());
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_parallelism() {
        let mut emb = EmbeddingConfig::default();
        assert_eq!(emb.parallelism(), None);

        emb.embedding_parallelism = "4".to_string();
        assert_eq!(emb.parallelism(), Some(4));

        for bad in ["0", "-1", "many"] {
            emb.embedding_parallelism = bad.to_string();
            let config = Config {
                embedding: emb.clone(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_validate_weights_and_top_k() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.store.keyword_weight = -0.1;
        assert!(config.validate().is_err());

        config.store.keyword_weight = 0.3;
        config.store.default_top_k = 0;
        assert!(config.validate().is_err());
    }
}
