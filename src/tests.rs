//! Store scenarios across the engine, keyword index and persistence.
//!
//! Everything here runs on the hashed tier, so no model download is needed.


use std::path::Path;
use std::sync::Arc;

use crate::semantic::{EmbeddingEngine, VectorMetadata, VectorStore, EMBEDDING_DIMENSIONS};

fn hashed_engine() -> Arc<EmbeddingEngine> {
    Arc::new(EmbeddingEngine::hashed_only(EMBEDDING_DIMENSIONS))
}

fn hashed_store(dir: &Path) -> VectorStore {
    VectorStore::new(hashed_engine(), dir.join("vectors.json"))
}

fn meta(description: &str, keywords: &[&str]) -> VectorMetadata {
    VectorMetadata {
        description: description.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        ..Default::default()
    }
}

/// Unit vector along one axis.
fn axis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
    v[index] = 1.0;
    v
}

fn ids(results: &[crate::semantic::SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}
