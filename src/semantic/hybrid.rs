//! Hybrid search combining semantic and keyword scores.
//!
//! Linear blend:
//!   combined(d) = semantic_weight * cosine(q, d) + keyword_weight * keyword(d)
//!
//! where keyword(d) is the share of query terms whose keyword bucket
//! contains d. Results at or below `MIN_COMBINED_SCORE` are dropped.

use std::collections::{HashMap, HashSet};

use crate::semantic::preprocess::tokenize;
use crate::semantic::similarity::rank_order;

pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.3;
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;

/// Minimum blended score worth returning.
pub const MIN_COMBINED_SCORE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub keyword: f32,
    pub semantic: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD_WEIGHT,
            semantic: DEFAULT_SEMANTIC_WEIGHT,
        }
    }
}

impl HybridWeights {
    pub fn new(keyword: f32, semantic: f32) -> Self {
        Self { keyword, semantic }
    }

    pub fn combine(&self, semantic: f32, keyword: f32) -> f32 {
        self.semantic * semantic + self.keyword * keyword
    }
}

/// Query terms for keyword scoring: tokenized, duplicates removed, order kept.
///
/// A repeated token counts once, so "beach beach mountain" has two terms and
/// an entry keyed only by "beach" scores 0.5 on it, not 2/3.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

/// Blend per-entry cosine scores with keyword scores.
///
/// `semantic` must yield every candidate entry; keyword scores for ids not
/// in it are ignored. Sorted by combined score (highest first, ties by id),
/// at most `top_k` results.
pub fn fuse<I>(
    semantic: I,
    keyword: &HashMap<String, f32>,
    weights: HybridWeights,
    top_k: usize,
) -> Vec<(String, f32)>
where
    I: IntoIterator<Item = (String, f32)>,
{
    let mut results: Vec<(String, f32)> = semantic
        .into_iter()
        .filter_map(|(id, cosine)| {
            let keyword_score = keyword.get(&id).copied().unwrap_or(0.0);
            let combined = weights.combine(cosine, keyword_score);
            (combined > MIN_COMBINED_SCORE).then_some((id, combined))
        })
        .collect();

    results.sort_by(rank_order);
    results.truncate(top_k);
    results
}

/// Rank by keyword score alone. Used when the query cannot be embedded.
pub fn keyword_only(keyword: HashMap<String, f32>, top_k: usize) -> Vec<(String, f32)> {
    let mut results: Vec<(String, f32)> = keyword.into_iter().collect();
    results.sort_by(rank_order);
    results.truncate(top_k);
    results
}
