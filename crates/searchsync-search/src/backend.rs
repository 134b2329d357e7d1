//! Search backend interface.

use serde_json::{Map, Value};

use crate::error::SearchError;

/// Flat key/value shape sent to a backend for one document.
pub type DocumentPayload = Map<String, Value>;

/// Longest field name accepted by [`default_field_name_rule`].
pub const MAX_FIELD_NAME_LEN: usize = 64;

/// A search service holding named indexes.
///
/// Index names passed here are backend names, with any variant prefix
/// already applied. Calls are synchronous from the caller's perspective.
pub trait SearchBackend: Send + Sync {
    /// Upsert documents, returning the ids the backend accepted.
    fn add_documents(&self, index: &str, documents: Vec<DocumentPayload>) -> Result<Vec<String>, SearchError>;

    /// Remove documents, returning the ids the backend removed.
    fn remove_documents(&self, index: &str, documents: Vec<DocumentPayload>) -> Result<Vec<String>, SearchError>;

    fn document_count(&self, index: &str) -> Result<usize, SearchError>;

    /// Delete up to `max_count` documents, returning how many were removed.
    fn clear_documents(&self, index: &str, max_count: usize) -> Result<usize, SearchError>;

    /// Byte budget for one serialized document, if the backend has one.
    fn max_document_size(&self) -> Option<usize>;

    fn validate_field_name(&self, name: &str) -> Result<(), SearchError> {
        default_field_name_rule(name)
    }

    fn get_document(&self, index: &str, id: &str) -> Result<Option<DocumentPayload>, SearchError>;

    fn list_documents(&self, index: &str, limit: usize, offset: usize) -> Result<Vec<DocumentPayload>, SearchError>;
}

/// Lowercase letters, digits and underscores, starting with a letter.
pub fn default_field_name_rule(name: &str) -> Result<(), SearchError> {
    let invalid = |reason: &str| {
        Err(SearchError::InvalidFieldName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let Some(first) = name.chars().next() else {
        return invalid("name is empty");
    };
    if name.len() > MAX_FIELD_NAME_LEN {
        return invalid("name is longer than 64 characters");
    }
    if !first.is_ascii_lowercase() {
        return invalid("name must start with a lowercase letter");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return invalid("only lowercase letters, digits and underscores are allowed");
    }
    Ok(())
}

/// The `id` value of a payload, as a string.
pub fn payload_id(payload: &DocumentPayload) -> Option<String> {
    match payload.get(searchsync_types::ID_FIELD)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
