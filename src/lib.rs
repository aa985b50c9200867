//! Local-first semantic search: a tiered embedding engine and a vector store
//! with keyword, semantic and hybrid retrieval.

pub mod config;
pub mod semantic;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};
pub use semantic::{
    EmbeddingEngine, HybridWeights, MediaType, SearchFilters, SearchResult, VectorEntry,
    VectorMetadata, VectorStore, EMBEDDING_DIMENSIONS,
};
