//! JSON document storage for vector entries.
//!
//! File format: vectors.json
//!
//! ```json
//! {
//!   "version": 1,
//!   "dimensions": 512,
//!   "model_id": "<hex sha256 of the embedding tiers>",
//!   "saved_at": "2024-06-01T12:00:00Z",
//!   "entries": [ { "id": ..., "vector": [...], "metadata": {...}, "updated_at": ... } ]
//! }
//! ```
//!
//! A bare array of entries (unversioned layout) is read as version 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::semantic::types::VectorEntry;

/// Current file format version
pub const FORMAT_VERSION: u32 = 1;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u32, u32),
}

/// A decoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub version: u32,
    pub dimensions: Option<usize>,
    pub model_id: Option<String>,
    pub entries: Vec<VectorEntry>,
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    version: u32,
    dimensions: usize,
    model_id: &'a str,
    saved_at: DateTime<Utc>,
    entries: Vec<&'a VectorEntry>,
}

#[derive(Deserialize)]
struct DocumentIn {
    version: u32,
    #[serde(default)]
    dimensions: Option<usize>,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    entries: Vec<VectorEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyDocument {
    Versioned(DocumentIn),
    Legacy(Vec<VectorEntry>),
}

/// Storage manager for the vector document.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the document. Returns `Ok(None)` if no document has been saved yet.
    pub fn load(&self) -> Result<Option<StoredDocument>, VectorStorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document = match serde_json::from_reader(BufReader::new(file))? {
            AnyDocument::Versioned(doc) => {
                if doc.version > FORMAT_VERSION {
                    return Err(VectorStorageError::VersionMismatch(doc.version, FORMAT_VERSION));
                }
                StoredDocument {
                    version: doc.version,
                    dimensions: doc.dimensions,
                    model_id: doc.model_id,
                    entries: doc.entries,
                }
            }
            AnyDocument::Legacy(entries) => StoredDocument {
                version: 0,
                dimensions: None,
                model_id: None,
                entries,
            },
        };

        Ok(Some(document))
    }

    /// Save entries to storage, sorted by id.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save<'a, I>(&self, entries: I, dimensions: usize, model_id: &str) -> Result<(), VectorStorageError>
    where
        I: IntoIterator<Item = &'a VectorEntry>,
    {
        let mut entries: Vec<&VectorEntry> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let document = DocumentOut {
            version: FORMAT_VERSION,
            dimensions,
            model_id,
            saved_at: Utc::now(),
            entries,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, &document);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        // Atomic rename
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(&self, path: &Path, document: &DocumentOut<'_>) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(&mut writer, document)?;

        // Flush and sync
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }
}
