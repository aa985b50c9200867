//! Local semantic search over media metadata.
//!
//! Text is turned into fixed-length vectors by a tiered embedding engine and
//! kept in an in-memory store with a keyword index, persisted as one JSON
//! document.
//!
//! # Architecture
//!
//! - `embeddings`: Embedding tiers and the fastembed sentence model wrapper
//! - `word_vectors`: Averaged pre-trained word vectors (GloVe text format)
//! - `hashing`: Deterministic bag-of-words hashing, the tier that never fails
//! - `engine`: Tier selection, batching and weighted metadata embedding
//! - `keywords`: Keyword inverted index
//! - `hybrid`: Keyword/semantic score blending
//! - `storage`: JSON file I/O for vectors.json persistence
//! - `store`: The vector store itself
//! - `preprocess`: Tokenizing and text preparation
//! - `similarity`: Cosine similarity and ranking

pub mod embeddings;
pub mod engine;
pub mod hashing;
pub mod hybrid;
pub mod keywords;
mod preprocess;
pub mod similarity;
pub mod storage;
pub mod store;
pub mod types;
pub mod word_vectors;

pub use embeddings::{EmbeddingError, EmbeddingTier, SentenceEmbedder, TextEmbedder};
pub use engine::EmbeddingEngine;
pub use hashing::HashEmbedder;
pub use hybrid::HybridWeights;
pub use keywords::KeywordIndex;
pub use preprocess::tokenize;
pub use similarity::{cosine_similarity, find_similar};
pub use storage::{VectorStorage, VectorStorageError};
pub use store::{RebuildReport, StoreError, VectorStore, DEFAULT_THRESHOLD, DEFAULT_TOP_K};
pub use types::{Location, MediaType, SearchFilters, SearchResult, VectorEntry, VectorMetadata};
pub use word_vectors::{WordEmbedder, WordVectors};

/// Length of every vector the engine produces.
pub const EMBEDDING_DIMENSIONS: usize = 512;

/// Default sentence model (384 dimensions, zero-padded to 512)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
