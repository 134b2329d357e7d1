//! Job persistence for searchsync.
//!
//! A RocksDB store holding one record per queued job. Keys are ULIDs, so
//! listing returns jobs in the order they were enqueued.

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::Storage;
pub use error::StorageError;
pub use keys::JobKey;
