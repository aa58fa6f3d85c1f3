//! Corpus file persistence.
//!
//! The corpus is a JSON array of records, newest first, rewritten wholesale
//! on every change.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::warn;

use crate::domain::Record;
use crate::persist::write_json_atomic;

/// Errors reading or writing the corpus file
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed corpus {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The persisted corpus at a fixed path
#[derive(Debug, Clone)]
pub struct CorpusFile {
    path: PathBuf,
}

impl CorpusFile {
    /// Corpus stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the corpus file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the corpus strictly; a missing file is an empty corpus
    pub async fn load(&self) -> Result<Vec<Record>, CorpusError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CorpusError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| CorpusError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the corpus, treating an unreadable file as a first run
    pub async fn load_or_empty(&self) -> Vec<Record> {
        match self.load().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Invalid or unreadable corpus, starting fresh");
                Vec::new()
            }
        }
    }

    /// Atomically replace the corpus file
    pub async fn save(&self, records: &[Record]) -> Result<(), CorpusError> {
        let path = self.path.clone();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || write_json_atomic(&path, &records))
            .await
            .map_err(|e| CorpusError::Io {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
            .map_err(|source| CorpusError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
