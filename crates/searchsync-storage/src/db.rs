//! RocksDB-backed job store.

use std::path::Path;

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::column_families::{build_cf_descriptors, CF_JOBS};
use crate::error::StorageError;
use crate::keys::JobKey;

/// Persistent job records.
///
/// Records are opaque bytes at this layer; the JSON helpers let the queue
/// keep its record type to itself.
pub struct Storage {
    db: DB,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!(path = %path.display(), "Opening job store");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_background_jobs(2);

        let db = DB::open_cf_descriptors(&opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn jobs(&self) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(CF_JOBS)
            .ok_or(StorageError::MissingColumnFamily(CF_JOBS))
    }

    /// Insert or overwrite a job record.
    pub fn put_job(&self, key: &JobKey, bytes: &[u8]) -> Result<(), StorageError> {
        self.db.put_cf(self.jobs()?, key.to_bytes(), bytes)?;
        debug!(job_id = %key, size = bytes.len(), "Stored job");
        Ok(())
    }

    pub fn get_job(&self, key: &JobKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get_cf(self.jobs()?, key.to_bytes())?)
    }

    /// Returns whether the record existed.
    pub fn delete_job(&self, key: &JobKey) -> Result<bool, StorageError> {
        let cf = self.jobs()?;
        if self.db.get_cf(cf, key.to_bytes())?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(cf, key.to_bytes())?;
        debug!(job_id = %key, "Deleted job");
        Ok(true)
    }

    /// Every job record, oldest first.
    pub fn list_jobs(&self) -> Result<Vec<(JobKey, Vec<u8>)>, StorageError> {
        let prefix = JobKey::prefix();
        let mut jobs = Vec::new();
        for item in self
            .db
            .iterator_cf(self.jobs()?, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            jobs.push((JobKey::from_bytes(&key)?, value.to_vec()));
        }
        Ok(jobs)
    }

    pub fn put_job_json<T: Serialize>(&self, key: &JobKey, value: &T) -> Result<(), StorageError> {
        self.put_job(key, &serde_json::to_vec(value)?)
    }

    pub fn get_job_json<T: DeserializeOwned>(&self, key: &JobKey) -> Result<Option<T>, StorageError> {
        self.get_job(key)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(StorageError::from))
            .transpose()
    }

    pub fn list_jobs_json<T: DeserializeOwned>(&self) -> Result<Vec<(JobKey, T)>, StorageError> {
        self.list_jobs()?
            .into_iter()
            .map(|(key, bytes)| Ok((key, serde_json::from_slice(&bytes)?)))
            .collect()
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_cf(self.jobs()?)?;
        Ok(())
    }
}
