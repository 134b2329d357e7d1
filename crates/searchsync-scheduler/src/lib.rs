//! Resumable indexing jobs and the machinery that runs them.
//!
//! # Features
//!
//! - Job state machines for indexing, full reindex, clearing an index and
//!   removal cascades, all resumable between ticks
//! - A RocksDB-backed queue with single-owner claims and retry with
//!   exponential backoff
//! - A batch processor and publish lifecycle handler that run jobs inline or
//!   queue them
//! - A cron worker (timezone-aware, graceful shutdown via
//!   `CancellationToken`) that drains the queue
//!
//! # Example
//!
//! ```ignore
//! use searchsync_scheduler::{
//!     create_queue_worker_job, JobEnvironment, JobQueue, RetryPolicy, SchedulerConfig,
//!     SchedulerService,
//! };
//!
//! let env = JobEnvironment::new(store, backend, config, settings.clear_index.clone());
//! let queue = Arc::new(JobQueue::new(storage, env, RetryPolicy::new(settings.retry.clone())));
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! create_queue_worker_job(&scheduler, Arc::clone(&queue)).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod env;
mod error;
pub mod jobs;
mod lifecycle;
mod overlap;
mod processor;
mod queue;
mod retry;
mod scheduler;
mod state;
mod worker;

#[cfg(test)]
mod test_support;

pub use config::SchedulerConfig;
pub use env::JobEnvironment;
pub use error::{JobError, SchedulerError};
pub use jobs::{BatchJob, ClearIndexJob, IndexJob, JobPayload, ReindexJob, RemoveCascadeJob, Tombstone};
pub use lifecycle::PublishLifecycle;
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use processor::{BatchProcessor, Dispatch};
pub use queue::{JobQueue, JobRecord, JobStatus, QueueRunSummary};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{validate_cron_expression, SchedulerService};
pub use state::{steps_for, JobState};
pub use worker::{create_queue_worker_job, QUEUE_WORKER_JOB};
