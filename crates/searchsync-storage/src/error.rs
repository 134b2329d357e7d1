//! Errors raised by the job store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// The database was opened without a column family this crate expects
    #[error("Missing column family '{0}'")]
    MissingColumnFamily(&'static str),

    #[error("Malformed job key: {0}")]
    InvalidKey(String),

    /// A stored job record could not be encoded or decoded
    #[error("Job record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
