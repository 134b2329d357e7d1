//! Error types shared across searchsync crates.

use thiserror::Error;

use crate::record::RecordId;

/// Broken configuration. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Settings could not be loaded or deserialized
    #[error("Settings error: {0}")]
    Settings(String),

    /// A field declared `type` at the top level instead of inside `options`
    #[error("Field `{field}` on `{type_name}` declares `type` outside of `options`")]
    FieldTypeOutsideOptions { type_name: String, field: String },

    /// A field declaration that is neither a bool nor a table
    #[error("Field `{field}` on `{type_name}` is malformed: {reason}")]
    MalformedField {
        type_name: String,
        field: String,
        reason: String,
    },

    /// Batch sizes must be positive
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(usize),

    /// A type referenced by configuration is not registered
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A relationship path names a segment that does not exist
    #[error("Path `{path}` on `{type_name}` has no segment `{segment}`")]
    UnknownPathSegment {
        type_name: String,
        path: String,
        segment: String,
    },

    /// An index name that is not configured
    #[error("Unknown index: {0}")]
    UnknownIndex(String),
}

/// Errors raised by a record store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Type is not part of the registry
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Relation is not declared on the type or its ancestors
    #[error("Unknown relation `{relation}` on `{type_name}`")]
    UnknownRelation { type_name: String, relation: String },

    /// Record does not exist in the requested view
    #[error("Record not found: {type_name}#{id}")]
    NotFound { type_name: String, id: RecordId },

    /// Underlying store failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised while examining a document.
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    /// Configuration problem surfaced while examining the document
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Record store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The record behind the document cannot be examined at all
    #[error("Document {identifier} cannot be resolved: {reason}")]
    Unresolvable { identifier: String, reason: String },

    /// A field value failed validation
    #[error("Invalid value for field `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}
