//! Search backend error types.

use thiserror::Error;

use searchsync_types::{ConfigError, DocumentError};

/// Errors that can occur while talking to a search backend or building
/// payloads for it.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The backend rejected or failed a request
    #[error("Backend error{}: {message}", status_suffix(.status))]
    Backend { status: Option<u16>, message: String },

    /// A field name the backend does not accept
    #[error("Invalid field name `{name}`: {reason}")]
    InvalidFieldName { name: String, reason: String },

    /// A projected value the payload cannot carry. This is a configuration
    /// problem, never a reason to skip the document.
    #[error("Field `{field}` of {identifier} cannot be indexed: {reason}")]
    InvalidFieldValue {
        identifier: String,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Payload (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl SearchError {
    pub fn backend(status: impl Into<Option<u16>>, message: impl Into<String>) -> Self {
        SearchError::Backend {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Status code carried by a backend failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SearchError::Backend { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}
