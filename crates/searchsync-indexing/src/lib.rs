//! # searchsync-indexing
//!
//! The indexing engine for searchsync.
//!
//! ## Key Components
//!
//! - [`RecordDocument`]: a document backed by a record store record
//! - [`RecordContext`]: store, configuration and indexability checks shared by documents
//! - [`discover_dependents`]: which documents embed data from a given document
//! - [`Indexer`]: chunked add/remove with dependency cascade
//! - [`RecordFetcher`]: pages a type through the record store
//!
//! ## Example
//!
//! ```ignore
//! use searchsync_indexing::{Indexer, IndexingEnv, IndexOperation};
//!
//! let env = IndexingEnv::new(backend, config, fetchers);
//! let mut indexer = Indexer::new(env, "main", documents, IndexOperation::Add, 100, true)?;
//! while !indexer.is_complete() {
//!     indexer.process_chunk()?;
//! }
//! ```

pub mod context;
pub mod dependency;
pub mod document;
pub mod error;
pub mod fetcher;
pub mod indexer;

pub use context::{IndexabilityCheck, RecordContext};
pub use dependency::{discover_dependents, probe_field, Hop};
pub use document::{RecordDocument, CAN_VIEW, SHOW_IN_SEARCH};
pub use error::IndexingError;
pub use fetcher::{register_record_fetchers, RecordFetcher};
pub use indexer::{IndexOperation, Indexer, IndexerStats, IndexingEnv};
