//! # searchsync-search
//!
//! Search backend boundary for searchsync.
//!
//! - [`SearchBackend`]: the operations the pipeline needs from a backend
//! - [`MemoryBackend`]: in-process backend with fault injection for tests
//! - [`Fetcher`] / [`FetcherRegistry`]: paging through source types
//! - [`DocumentBuilder`]: documents to payloads and back, with truncation

pub mod backend;
pub mod builder;
pub mod error;
pub mod fetcher;
pub mod memory;
pub mod truncate;

pub use backend::{default_field_name_rule, payload_id, DocumentPayload, SearchBackend};
pub use builder::{DocumentBuilder, PROTECTED_FIELDS};
pub use error::SearchError;
pub use fetcher::{Fetcher, FetcherRegistry};
pub use memory::{CallCounts, MemoryBackend};
pub use truncate::{truncate_payload, TruncationReport};
