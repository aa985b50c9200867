//! Vector math and ranked top-k selection.
//!
//! Brute-force cosine similarity over arbitrary candidates; no index
//! acceleration.

use std::cmp::Ordering;

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length in place.
///
/// Returns false (and leaves the vector untouched) if its norm is zero.
pub fn normalize(v: &mut [f32]) -> bool {
    let norm = l2_norm(v);
    if norm < f32::EPSILON || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// Zero-pad a vector to `dimensions`.
///
/// Padding preserves dot products and norms, so cosine scores between fitted
/// vectors are unchanged. Vectors wider than `dimensions` are rejected.
pub fn fit_dimensions(mut v: Vec<f32>, dimensions: usize) -> Option<Vec<f32>> {
    if v.len() > dimensions {
        return None;
    }
    v.resize(dimensions, 0.0);
    Some(v)
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when lengths differ, either vector is empty, or either norm is
/// zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot_product / (norm_a * norm_b)
}

/// Descending by score, then ascending by id.
pub(crate) fn rank_order<K: Ord>(a: &(K, f32), b: &(K, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Score every candidate against `query` and return the best matches.
///
/// Keeps candidates scoring at or above `threshold`, sorted by score
/// (highest first, ties by id ascending), at most `top_k` of them.
pub fn find_similar<'a, K, I>(query: &[f32], candidates: I, top_k: usize, threshold: f32) -> Vec<(K, f32)>
where
    K: Ord,
    I: IntoIterator<Item = (K, &'a [f32])>,
{
    if top_k == 0 {
        return Vec::new();
    }

    let mut results: Vec<(K, f32)> = candidates
        .into_iter()
        .filter_map(|(id, vector)| {
            let score = cosine_similarity(query, vector);
            (score >= threshold).then_some((id, score))
        })
        .collect();

    results.sort_by(rank_order);
    results.truncate(top_k);
    results
}
