//! Keyword inverted index.
//!
//! Maps lower-cased keyword terms to the ids of the entries carrying them.
//! The index is derived data: it can always be rebuilt from the keyword
//! lists of the live entries.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::semantic::preprocess::tokenize;

/// Terms a keyword is indexed under: the whole lower-cased keyword plus the
/// tokens a query could match it by.
pub fn keyword_terms(keyword: &str) -> BTreeSet<String> {
    let mut terms: BTreeSet<String> = tokenize(keyword).into_iter().collect();
    let whole = keyword.trim().to_lowercase();
    if !whole.is_empty() {
        terms.insert(whole);
    }
    terms
}

/// Union of `keyword_terms` over a keyword list.
pub fn terms_for(keywords: &[String]) -> BTreeSet<String> {
    keywords.iter().flat_map(|k| keyword_terms(k)).collect()
}

#[derive(Debug, Default, Clone)]
pub struct KeywordIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Associate `id` with every term of `keywords`.
    pub fn insert(&mut self, id: &str, keywords: &[String]) {
        for term in terms_for(keywords) {
            self.buckets.entry(term).or_default().insert(id.to_string());
        }
    }

    /// Drop `id` from the buckets of `keywords`, removing buckets left empty.
    pub fn remove(&mut self, id: &str, keywords: &[String]) {
        for term in terms_for(keywords) {
            if let Some(ids) = self.buckets.get_mut(&term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.buckets.remove(&term);
                }
            }
        }
    }

    /// Replace the keyword associations of `id`.
    pub fn update(&mut self, id: &str, old_keywords: &[String], new_keywords: &[String]) {
        self.remove(id, old_keywords);
        self.insert(id, new_keywords);
    }

    /// Ids indexed under `term` (matched lower-cased).
    pub fn ids(&self, term: &str) -> Option<&HashSet<String>> {
        self.buckets.get(&term.trim().to_lowercase())
    }

    /// True if any bucket still references `id`.
    pub fn contains_id(&self, id: &str) -> bool {
        self.buckets.values().any(|ids| ids.contains(id))
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Keyword score per entry for a tokenized query.
    ///
    /// Each query term present in the index adds `1 / terms.len()` to every id
    /// in its bucket, so an entry matching all terms scores 1.0.
    pub fn score(&self, terms: &[String]) -> HashMap<String, f32> {
        let mut scores: HashMap<String, f32> = HashMap::new();
        if terms.is_empty() {
            return scores;
        }

        let share = 1.0 / terms.len() as f32;
        for term in terms {
            if let Some(ids) = self.buckets.get(term) {
                for id in ids {
                    *scores.entry(id.clone()).or_insert(0.0) += share;
                }
            }
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_keyword_terms() {
        let terms = keyword_terms("Golden Gate");
        assert!(terms.contains("golden gate"));
        assert!(terms.contains("golden"));
        assert!(terms.contains("gate"));

        // short keywords are still findable as a whole
        assert_eq!(keyword_terms("NY").into_iter().collect::<Vec<_>>(), vec!["ny"]);
        assert!(keyword_terms("   ").is_empty());
    }

    #[test]
    fn test_insert_and_lookup_case_insensitive() {
        let mut index = KeywordIndex::new();
        index.insert("a", &kw(&["Beach", "sunset"]));
        index.insert("b", &kw(&["beach"]));

        let ids = index.ids("BEACH").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(index.ids("sunset").unwrap().contains("a"));
        assert!(index.ids("mountain").is_none());
    }

    #[test]
    fn test_remove_drops_empty_buckets() {
        let mut index = KeywordIndex::new();
        index.insert("a", &kw(&["beach"]));
        index.insert("b", &kw(&["beach", "dune"]));

        index.remove("b", &kw(&["beach", "dune"]));

        assert!(!index.contains_id("b"));
        assert!(index.ids("dune").is_none());
        assert_eq!(index.ids("beach").unwrap().len(), 1);
    }

    #[test]
    fn test_update_replaces_associations() {
        let mut index = KeywordIndex::new();
        index.insert("a", &kw(&["beach", "sunset"]));
        index.update("a", &kw(&["beach", "sunset"]), &kw(&["mountain"]));

        assert!(index.ids("beach").is_none());
        assert!(index.ids("sunset").is_none());
        assert!(index.ids("mountain").unwrap().contains("a"));
    }

    #[test]
    fn test_score_distributes_shares() {
        let mut index = KeywordIndex::new();
        index.insert("a", &kw(&["beach", "sunset"]));
        index.insert("b", &kw(&["beach"]));
        index.insert("c", &kw(&["mountain"]));

        let scores = index.score(&kw(&["beach", "sunset"]));

        assert!((scores["a"] - 1.0).abs() < 1e-6);
        assert!((scores["b"] - 0.5).abs() < 1e-6);
        assert!(!scores.contains_key("c"));
        assert!(index.score(&[]).is_empty());
    }
}
