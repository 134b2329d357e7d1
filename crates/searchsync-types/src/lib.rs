//! # searchsync-types
//!
//! Shared data model for the searchsync indexing pipeline.
//!
//! This crate defines the structures every other crate builds on:
//! - Records and the registered type tree they belong to
//! - The record store interface, plus an in-memory implementation
//! - Field projection rules and field values
//! - The document abstraction and its persistable reference
//! - Layered settings and tracing setup
//!
//! ## Usage
//!
//! ```rust
//! use searchsync_types::{Record, TypeDef, TypeRegistry, MemoryRecordStore};
//!
//! let registry = TypeRegistry::new(vec![TypeDef::new("Tag").attribute("name")]).unwrap();
//! let store = MemoryRecordStore::new(registry);
//! store.write(Record::new("Tag", 1).with_attribute("name", "rust")).unwrap();
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod field;
pub mod logging;
pub mod memory_store;
pub mod record;
pub mod registry;
pub mod store;
pub mod value;

pub use config::{
    ClearIndexSettings, IncludeSettings, IndexSettings, RetrySettings, SearchSettings, Settings,
};
pub use document::{
    document_identifier, DependencyTracking, Document, DocumentHandle, DocumentHooks,
    DocumentRef, IndexEvent, BASE_TYPE_FIELD, ID_FIELD, RECORD_ID_FIELD, SOURCE_TYPE_FIELD,
};
pub use error::{ConfigError, DocumentError, StoreError};
pub use field::Field;
pub use logging::init_logging;
pub use memory_store::MemoryRecordStore;
pub use record::{Record, RecordId};
pub use registry::{RelationDef, RelationKind, TypeDef, TypeRegistry};
pub use store::{resolve_path, RecordStore, Resolved, View, ID_SEGMENT};
pub use value::FieldValue;
