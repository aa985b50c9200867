//! Word-embedding fallback tier.
//!
//! Reads a plain-text word vector table (GloVe layout: `word v1 v2 ... vn`
//! per line; an optional word2vec `count dims` header line is skipped) and
//! embeds text as the average of its resolved word vectors.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::semantic::embeddings::{EmbeddingError, EmbeddingTier, TextEmbedder};
use crate::semantic::preprocess::words;

/// In-memory word -> vector table.
#[derive(Debug)]
pub struct WordVectors {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
}

impl WordVectors {
    /// Parse a word vector table from any reader.
    ///
    /// Every row must have the same number of values as the first one.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, EmbeddingError> {
        let mut vectors = HashMap::new();
        let mut dimensions = 0;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };

            let values = parts
                .map(|v| v.parse::<f32>())
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| {
                    EmbeddingError::InitFailed(format!("line {}: {}", line_no + 1, e))
                })?;

            // word2vec text files start with "<count> <dims>"
            if line_no == 0 && values.len() == 1 && word.parse::<usize>().is_ok() {
                continue;
            }

            if values.is_empty() {
                continue;
            }
            if dimensions == 0 {
                dimensions = values.len();
            } else if values.len() != dimensions {
                return Err(EmbeddingError::InitFailed(format!(
                    "line {}: expected {} values, got {}",
                    line_no + 1,
                    dimensions,
                    values.len()
                )));
            }

            vectors.insert(word.to_lowercase(), values);
        }

        if vectors.is_empty() {
            return Err(EmbeddingError::InitFailed("word vector table is empty".to_string()));
        }

        Ok(Self { vectors, dimensions })
    }

    /// Load a word vector table from a file.
    pub fn load(path: &Path) -> Result<Self, EmbeddingError> {
        let file = File::open(path).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(|v| v.as_slice())
    }

    /// Element-wise mean of every resolvable word in `text`.
    pub fn average(&self, text: &str) -> Option<Vec<f32>> {
        let mut sum = vec![0.0f32; self.dimensions];
        let mut resolved = 0usize;

        for word in words(text) {
            if let Some(vector) = self.get(&word) {
                for (acc, value) in sum.iter_mut().zip(vector) {
                    *acc += value;
                }
                resolved += 1;
            }
        }

        if resolved == 0 {
            return None;
        }

        let count = resolved as f32;
        sum.iter_mut().for_each(|x| *x /= count);
        Some(sum)
    }
}

/// Fallback tier backed by a word vector table loaded on first use.
pub struct WordEmbedder {
    path: PathBuf,
    max_dimensions: usize,
    table: OnceCell<Option<WordVectors>>,
}

impl WordEmbedder {
    pub fn new(path: PathBuf, max_dimensions: usize) -> Self {
        Self {
            path,
            max_dimensions,
            table: OnceCell::new(),
        }
    }

    /// Wrap an already loaded table.
    pub fn from_table(table: WordVectors, max_dimensions: usize) -> Self {
        Self {
            path: PathBuf::new(),
            max_dimensions,
            table: OnceCell::with_value(Self::check_dimensions(table, max_dimensions).ok()),
        }
    }

    fn check_dimensions(table: WordVectors, max: usize) -> Result<WordVectors, EmbeddingError> {
        if table.dimensions() > max {
            return Err(EmbeddingError::DimensionTooLarge {
                max,
                got: table.dimensions(),
            });
        }
        Ok(table)
    }

    fn table(&self) -> Option<&WordVectors> {
        self.table
            .get_or_init(|| {
                match WordVectors::load(&self.path)
                    .and_then(|t| Self::check_dimensions(t, self.max_dimensions))
                {
                    Ok(table) => {
                        log::info!(
                            "Loaded {} word vectors ({} dimensions) from {}",
                            table.len(),
                            table.dimensions(),
                            self.path.display()
                        );
                        Some(table)
                    }
                    Err(e) => {
                        log::warn!("Word vectors unavailable: {}", e);
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl TextEmbedder for WordEmbedder {
    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::WordVectors
    }

    fn identity(&self) -> String {
        format!("words:{}", self.path.display())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let table = self
            .table()
            .ok_or_else(|| EmbeddingError::Unavailable(self.path.display().to_string()))?;
        table.average(text).ok_or(EmbeddingError::NoSignal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TABLE: &str = "beach 1.0 0.0 0.0\nsunset 0.0 1.0 0.0\nMountain 0.0 0.0 1.0\n";

    #[test]
    fn test_parse_glove_table() {
        let table = WordVectors::from_reader(Cursor::new(TABLE)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.dimensions(), 3);
        assert_eq!(table.get("mountain"), Some(&[0.0, 0.0, 1.0][..]));
    }

    #[test]
    fn test_skips_word2vec_header() {
        let data = format!("3 3\n{}", TABLE);
        let table = WordVectors::from_reader(Cursor::new(data)).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.get("3").is_none());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let data = "beach 1.0 0.0\nsunset 0.0 1.0 0.0\n";
        assert!(WordVectors::from_reader(Cursor::new(data)).is_err());
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(WordVectors::from_reader(Cursor::new("")).is_err());
    }

    #[test]
    fn test_average_of_resolved_words() {
        let table = WordVectors::from_reader(Cursor::new(TABLE)).unwrap();
        let avg = table.average("Beach at sunset").unwrap();
        assert_eq!(avg, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_no_resolved_words() {
        let table = WordVectors::from_reader(Cursor::new(TABLE)).unwrap();
        assert!(table.average("quantum chromodynamics").is_none());

        let embedder = WordEmbedder::from_table(table, 8);
        assert!(matches!(embedder.embed("quantum"), Err(EmbeddingError::NoSignal)));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let embedder = WordEmbedder::new(PathBuf::from("/nonexistent/glove.txt"), 512);
        assert!(matches!(embedder.embed("beach"), Err(EmbeddingError::Unavailable(_))));
        // the failed load is not retried
        assert!(matches!(embedder.embed("beach"), Err(EmbeddingError::Unavailable(_))));
    }

    #[test]
    fn test_table_wider_than_store_is_unavailable() {
        let table = WordVectors::from_reader(Cursor::new(TABLE)).unwrap();
        let embedder = WordEmbedder::from_table(table, 2);
        assert!(matches!(embedder.embed("beach"), Err(EmbeddingError::Unavailable(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        std::fs::write(&path, TABLE).unwrap();

        let embedder = WordEmbedder::new(path, 512);
        assert_eq!(embedder.embed("sunset").unwrap(), vec![0.0, 1.0, 0.0]);
    }
}
