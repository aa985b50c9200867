//! Vector store: keyed entries, keyword index, search and persistence.
//!
//! All mutable state lives in one `StoreState` behind a single mutex, so an
//! entry and its keyword associations always change together. Query
//! embedding happens before the lock is taken.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::semantic::embeddings::EmbeddingError;
use crate::semantic::engine::EmbeddingEngine;
use crate::semantic::hybrid::{fuse, keyword_only, query_terms, HybridWeights};
use crate::semantic::keywords::KeywordIndex;
use crate::semantic::similarity::{cosine_similarity, find_similar};
use crate::semantic::storage::{VectorStorage, VectorStorageError, FORMAT_VERSION};
use crate::semantic::types::{SearchFilters, SearchResult, VectorEntry, VectorMetadata};
use crate::semantic::EMBEDDING_DIMENSIONS;

/// Default number of results returned by a search.
pub const DEFAULT_TOP_K: usize = 10;

/// Default minimum cosine similarity for vector search.
pub const DEFAULT_THRESHOLD: f32 = 0.25;

/// Errors from opening a store or upserting into it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Vector for '{0}' contains NaN or infinite values")]
    NonFiniteVector(String),
}

/// Outcome of `VectorStore::rebuild_embeddings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Entries whose vector was recomputed
    pub rebuilt: usize,
    /// Entries left untouched (no embeddable field, or changed meanwhile)
    pub skipped: usize,
    /// Whether the store was persisted afterwards
    pub saved: bool,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, VectorEntry>,
    keywords: KeywordIndex,
    /// Version of a document on disk too new to read. Saving is refused while set.
    newer_document: Option<u32>,
}

impl StoreState {
    /// Insert or replace an entry, moving its keyword associations with it.
    fn insert(&mut self, entry: VectorEntry) {
        match self.entries.get(&entry.id) {
            Some(old) => self.keywords.update(
                &entry.id,
                &old.metadata.keywords,
                &entry.metadata.keywords,
            ),
            None => self.keywords.insert(&entry.id, &entry.metadata.keywords),
        }
        self.entries.insert(entry.id.clone(), entry);
    }

    fn remove(&mut self, id: &str) -> Option<VectorEntry> {
        let entry = self.entries.remove(id)?;
        self.keywords.remove(id, &entry.metadata.keywords);
        Some(entry)
    }

    fn passes(entry: &VectorEntry, filters: Option<&SearchFilters>) -> bool {
        filters.map_or(true, |f| f.matches(&entry.metadata))
    }

    fn candidates<'a>(
        &'a self,
        filters: Option<&'a SearchFilters>,
    ) -> impl Iterator<Item = &'a VectorEntry> + 'a {
        self.entries
            .values()
            .filter(move |entry| Self::passes(entry, filters))
    }

    fn results(&self, ranked: Vec<(String, f32)>) -> Vec<SearchResult> {
        ranked
            .into_iter()
            .filter_map(|(id, score)| {
                self.entries.get(&id).map(|entry| SearchResult {
                    metadata: entry.metadata.clone(),
                    id,
                    score,
                })
            })
            .collect()
    }
}

/// Durable keyed collection of embedded entries.
///
/// Safe to share between threads; every operation on the entry map and the
/// keyword index runs under one lock.
pub struct VectorStore {
    engine: Arc<EmbeddingEngine>,
    storage: VectorStorage,
    state: Mutex<StoreState>,
}

impl VectorStore {
    /// Create an empty store persisting to `path`. Nothing is read from disk.
    pub fn new(engine: Arc<EmbeddingEngine>, path: PathBuf) -> Self {
        Self {
            engine,
            storage: VectorStorage::new(path),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Build the engine described by `config`, then open and load the
    /// document in `base_path`.
    pub fn open(config: &Config, base_path: &Path) -> Result<Self, StoreError> {
        log::info!(
            "Opening vector store in {} (sentence model: {})",
            base_path.display(),
            if config.embedding.sentence_model_enabled {
                config.embedding.sentence_model.as_str()
            } else {
                "disabled"
            }
        );

        let engine = EmbeddingEngine::from_config(&config.embedding, base_path, EMBEDDING_DIMENSIONS)?;
        let store = Self::new(Arc::new(engine), base_path.join(&config.store.file_name));
        store.load_from_disk();
        Ok(store)
    }

    pub fn engine(&self) -> &Arc<EmbeddingEngine> {
        &self.engine
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(
        id: String,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<VectorEntry, StoreError> {
        // non-finite values serialize as null and would make the document unreadable
        if !vector.iter().all(|x| x.is_finite()) {
            return Err(StoreError::NonFiniteVector(id));
        }

        Ok(VectorEntry {
            id,
            vector,
            metadata,
            updated_at: Utc::now(),
        })
    }

    /// Insert or wholly replace the entry for `id`.
    ///
    /// Vectors containing NaN or infinite values are rejected.
    pub fn upsert(
        &self,
        id: impl Into<String>,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), StoreError> {
        let entry = Self::entry(id.into(), vector, metadata)?;
        self.state().insert(entry);
        Ok(())
    }

    /// Upsert each entry in order, skipping rejected vectors.
    ///
    /// Returns the number of entries stored.
    pub fn upsert_batch<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, Vec<f32>, VectorMetadata)>,
    {
        let mut state = self.state();
        let mut stored = 0;
        for (id, vector, metadata) in entries {
            match Self::entry(id, vector, metadata) {
                Ok(entry) => {
                    state.insert(entry);
                    stored += 1;
                }
                Err(e) => log::warn!("Skipping batch entry: {}", e),
            }
        }
        stored
    }

    /// Embed `metadata` and upsert it under `id`.
    ///
    /// Returns false, leaving the store untouched, when no field could be
    /// embedded.
    pub fn index_metadata(&self, id: impl Into<String>, metadata: VectorMetadata) -> bool {
        let id = id.into();
        match self.engine.embed_metadata(&metadata) {
            Some(vector) => match self.upsert(id, vector, metadata) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Not indexed: {}", e);
                    false
                }
            },
            None => {
                log::warn!("Nothing to embed for '{}', not indexed", id);
                false
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<VectorEntry> {
        self.state().entries.get(id).cloned()
    }

    /// Remove the entry for `id`. Returns false if there was none.
    pub fn delete(&self, id: &str) -> bool {
        self.state().remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// All entry ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids indexed under a keyword term, sorted.
    pub fn keyword_ids(&self, keyword: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state()
            .keywords
            .ids(keyword)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Semantic search for `query`.
    ///
    /// Returns an empty list when the query cannot be embedded.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
        filters: Option<&SearchFilters>,
    ) -> Vec<SearchResult> {
        let Some(query_vector) = self.engine.embed(query) else {
            log::warn!("Query {:?} produced no embedding, returning no results", query);
            return Vec::new();
        };
        self.search_by_vector(&query_vector, top_k, threshold, filters)
    }

    /// Brute-force nearest-neighbour search over the entries passing `filters`.
    ///
    /// Results score at least `threshold`, highest first (ties by id), at
    /// most `top_k` of them.
    pub fn search_by_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
        threshold: f32,
        filters: Option<&SearchFilters>,
    ) -> Vec<SearchResult> {
        let state = self.state();

        let candidates = state
            .candidates(filters)
            .map(|entry| (entry.id.as_str(), entry.vector.as_slice()));

        let ranked = find_similar(query_vector, candidates, top_k, threshold)
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();

        state.results(ranked)
    }

    /// Blend keyword overlap and semantic similarity.
    ///
    /// Falls back to keyword-only ranking when the query cannot be embedded.
    pub fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        weights: HybridWeights,
        filters: Option<&SearchFilters>,
    ) -> Vec<SearchResult> {
        let terms = query_terms(query);
        let query_vector = self.engine.embed(query);

        let state = self.state();

        let keyword_scores: HashMap<String, f32> = state
            .keywords
            .score(&terms)
            .into_iter()
            .filter(|(id, _)| {
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| StoreState::passes(entry, filters))
            })
            .collect();

        let ranked = match query_vector {
            Some(query_vector) => {
                let semantic = state.candidates(filters).map(|entry| {
                    (entry.id.clone(), cosine_similarity(&query_vector, &entry.vector))
                });
                fuse(semantic, &keyword_scores, weights, top_k)
            }
            None => {
                log::warn!("Query {:?} produced no embedding, using keyword ranking only", query);
                keyword_only(keyword_scores, top_k)
            }
        };

        state.results(ranked)
    }

    /// Recompute every entry's vector from its metadata, then persist.
    ///
    /// Embedding runs without holding the store lock; an entry rewritten in
    /// the meantime keeps its newer vector.
    pub fn rebuild_embeddings(&self) -> RebuildReport {
        let snapshot: Vec<(String, VectorMetadata, DateTime<Utc>)> = self
            .state()
            .entries
            .values()
            .map(|entry| (entry.id.clone(), entry.metadata.clone(), entry.updated_at))
            .collect();

        log::info!("Rebuilding embeddings for {} entries", snapshot.len());

        let vectors: Vec<Option<Vec<f32>>> = snapshot
            .iter()
            .map(|(_, metadata, _)| self.engine.embed_metadata(metadata))
            .collect();

        let mut report = RebuildReport::default();
        {
            let mut state = self.state();
            let now = Utc::now();

            for ((id, _, seen_at), vector) in snapshot.into_iter().zip(vectors) {
                match (vector, state.entries.get_mut(&id)) {
                    (Some(vector), Some(entry)) if entry.updated_at == seen_at => {
                        entry.vector = vector;
                        entry.updated_at = now;
                        report.rebuilt += 1;
                    }
                    _ => report.skipped += 1,
                }
            }
        }

        match self.save_to_disk() {
            Ok(()) => report.saved = true,
            Err(e) => log::error!("Failed to save rebuilt embeddings: {}", e),
        }

        log::info!(
            "Rebuilt {} embeddings, skipped {}",
            report.rebuilt,
            report.skipped
        );
        report
    }

    /// Write every entry to the store document.
    ///
    /// Refused when the document on disk has a newer format than this build
    /// reads, so it is not overwritten.
    pub fn save_to_disk(&self) -> Result<(), VectorStorageError> {
        let state = self.state();
        if let Some(version) = state.newer_document {
            log::error!(
                "Not saving: {} has format version {}, newer than {}",
                self.storage.path().display(),
                version,
                FORMAT_VERSION
            );
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }
        self.storage.save(
            state.entries.values(),
            self.engine.dimensions(),
            &self.engine.model_id(),
        )?;
        log::info!("Saved {} vectors to {}", state.entries.len(), self.storage.path().display());
        Ok(())
    }

    /// Merge the store document into memory, overwriting entries by id.
    ///
    /// Returns the number of entries loaded. A missing document loads nothing;
    /// an unreadable one is logged and loads nothing.
    pub fn load_from_disk(&self) -> usize {
        let mut state = self.state();

        let document = match self.storage.load() {
            Ok(Some(document)) => document,
            Ok(None) => {
                log::info!("No existing index at {}, starting fresh", self.storage.path().display());
                return 0;
            }
            Err(e) => {
                if let VectorStorageError::VersionMismatch(version, _) = e {
                    state.newer_document = Some(version);
                }
                log::error!("Failed to load vectors from {}: {}", self.storage.path().display(), e);
                return 0;
            }
        };

        if document
            .model_id
            .as_deref()
            .is_some_and(|id| id != self.engine.model_id())
        {
            log::warn!("Stored vectors come from a different embedding setup, consider rebuilding");
        }
        if document
            .dimensions
            .is_some_and(|dims| dims != self.engine.dimensions())
        {
            log::warn!(
                "Stored vectors have {:?} dimensions, engine produces {}",
                document.dimensions,
                self.engine.dimensions()
            );
        }

        let loaded = document.entries.len();
        for entry in document.entries {
            state.insert(entry);
        }

        log::info!("Loaded {} vectors (format version {})", loaded, document.version);
        loaded
    }

    /// Drop every entry and delete the store document.
    pub fn clear(&self) -> Result<(), VectorStorageError> {
        let mut state = self.state();
        state.entries.clear();
        state.keywords.clear();
        self.storage.delete()?;
        state.newer_document = None;
        Ok(())
    }
}
