//! Error types for the scheduler crate.
//!
//! [`SchedulerError`] covers the cron service and the job queue.
//! [`JobError`] is what a job's `setup` or `process` step fails with; the
//! retry policy classifies it through [`JobError::status_code`].

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use searchsync_indexing::IndexingError;
use searchsync_search::SearchError;
use searchsync_storage::StorageError;
use searchsync_types::{ConfigError, DocumentError, DocumentRef};

/// Errors raised by a job step.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The document a removal cascade starts from is gone and was never versioned
    #[error("Record {0} no longer exists and has no archived version")]
    MissingRecord(DocumentRef),

    /// Documents were still reported after the completion polling window
    #[error("Index '{index}' still reports {remaining} documents after clearing; re-run the clear job or inspect the backend")]
    ClearIncomplete { index: String, remaining: usize },
}

impl JobError {
    /// Status code carried by a backend failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            JobError::Indexing(e) => e.status_code(),
            JobError::Search(e) => e.status_code(),
            _ => None,
        }
    }
}

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Job not found in the queue
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Scheduler is already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler is not running")]
    NotRunning,

    /// Job persistence failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A job run inline failed
    #[error("Job failed: {0}")]
    Job(#[from] JobError),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}
