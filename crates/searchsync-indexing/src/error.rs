//! Error types for the indexing engine.

use searchsync_search::SearchError;
use searchsync_types::{ConfigError, DocumentError, StoreError};
use thiserror::Error;

/// Errors that can occur while indexing documents
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Search backend or payload failure
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Document could not be examined
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Broken configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Record store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IndexingError {
    /// Status code carried by a backend failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            IndexingError::Search(e) => e.status_code(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}
