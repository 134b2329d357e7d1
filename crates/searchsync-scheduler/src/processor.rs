//! Entry point for ad-hoc indexing work.
//!
//! Callers hand over document references; the processor either runs the
//! resulting job inline or queues it, depending on `search.use_sync_jobs`
//! and on whether a queue is attached at all.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use searchsync_indexing::IndexOperation;
use searchsync_storage::JobKey;
use searchsync_types::DocumentRef;

use crate::env::JobEnvironment;
use crate::error::SchedulerError;
use crate::jobs::{IndexJob, JobPayload};
use crate::queue::JobQueue;
use crate::state::JobState;

/// What happened to a dispatched job.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Ran inline to completion
    Ran(JobState),
    /// Persisted for the queue worker
    Queued(JobKey),
    /// Search indexing is switched off
    Disabled,
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    env: JobEnvironment,
    queue: Option<Arc<JobQueue>>,
}

impl BatchProcessor {
    /// Processor that always runs jobs inline.
    pub fn new(env: JobEnvironment) -> Self {
        Self { env, queue: None }
    }

    /// Processor that queues jobs unless `use_sync_jobs` is set.
    pub fn with_queue(queue: Arc<JobQueue>) -> Self {
        Self {
            env: queue.env().clone(),
            queue: Some(queue),
        }
    }

    pub fn env(&self) -> &JobEnvironment {
        &self.env
    }

    /// Index `documents` into `index`, cascading to their dependents.
    pub fn add_documents(&self, index: &str, documents: Vec<DocumentRef>) -> Result<Dispatch, SchedulerError> {
        self.dispatch(IndexJob::new(index, documents, IndexOperation::Add, true))
    }

    /// Remove `documents` from `index`.
    pub fn remove_documents(&self, index: &str, documents: Vec<DocumentRef>) -> Result<Dispatch, SchedulerError> {
        self.dispatch(IndexJob::new(index, documents, IndexOperation::Delete, false))
    }

    /// Run or queue any job.
    pub fn dispatch(&self, payload: impl Into<JobPayload>) -> Result<Dispatch, SchedulerError> {
        if !self.env.config().enabled() {
            return Ok(Dispatch::Disabled);
        }

        let mut payload = payload.into();
        match &self.queue {
            Some(queue) if !self.env.config().use_sync_jobs() => {
                let key = queue.enqueue(payload, Utc::now())?;
                Ok(Dispatch::Queued(key))
            }
            _ => {
                debug!(kind = payload.kind(), "Running job inline");
                let state = payload.run_to_completion(&self.env)?;
                Ok(Dispatch::Ran(state))
            }
        }
    }
}
