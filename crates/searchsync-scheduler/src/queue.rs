//! Persistent job queue.
//!
//! Job records live in RocksDB under ULID keys, so they survive restarts and
//! scan in enqueue order. A job is owned by at most one worker at a time:
//! [`JobQueue::claim`] marks it running under the worker's id, and the
//! marker is cleared when the job completes or fails.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use searchsync_storage::{JobKey, Storage};

use crate::env::JobEnvironment;
use crate::error::SchedulerError;
use crate::jobs::JobPayload;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::state::JobState;

/// Lifecycle of a persisted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its first run
    Queued,
    /// Claimed by a worker
    Running,
    /// Failed with a retryable error, parked until `next_run_at`
    Waiting,
    Completed,
    /// Failed for good
    Broken,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Broken)
    }
}

/// A job as stored in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub payload: JobPayload,
    pub state: JobState,
    pub status: JobStatus,
    pub attempts: u32,
    pub next_run_at: DateTime<Utc>,
    /// Owning worker while running
    pub worker: Option<String>,
    pub setup_done: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    fn new(key: &JobKey, payload: JobPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: key.job_id(),
            payload,
            state: JobState::new(),
            status: JobStatus::Queued,
            attempts: 0,
            next_run_at: now,
            worker: None,
            setup_done: false,
            last_error: None,
            created_at: now,
        }
    }

    /// Whether a worker may pick the job up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Waiting)
            && self.worker.is_none()
            && self.next_run_at <= now
    }

    /// Drop the owner marker and make the job runnable again.
    fn release(&mut self) {
        self.status = if self.attempts == 0 {
            JobStatus::Queued
        } else {
            JobStatus::Waiting
        };
        self.worker = None;
    }
}

/// Outcome counts of one [`JobQueue::run_due`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueRunSummary {
    pub ran: usize,
    pub completed: usize,
    pub rescheduled: usize,
    pub broken: usize,
}

pub struct JobQueue {
    storage: Arc<Storage>,
    env: JobEnvironment,
    retry: RetryPolicy,
    worker_id: String,
    claim_lock: Mutex<()>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("worker_id", &self.worker_id)
            .field("retry", &self.retry)
            .finish()
    }
}

impl JobQueue {
    pub fn new(storage: Arc<Storage>, env: JobEnvironment, retry: RetryPolicy) -> Self {
        Self {
            storage,
            env,
            retry,
            worker_id: "searchsync-worker".to_string(),
            claim_lock: Mutex::new(()),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn env(&self) -> &JobEnvironment {
        &self.env
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Persist a new job, runnable from `now`.
    pub fn enqueue(&self, payload: impl Into<JobPayload>, now: DateTime<Utc>) -> Result<JobKey, SchedulerError> {
        let key = JobKey::new();
        let record = JobRecord::new(&key, payload.into(), now);
        self.storage.put_job_json(&key, &record)?;
        info!(job_id = %record.id, kind = record.payload.kind(), "Job queued");
        Ok(key)
    }

    pub fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, SchedulerError> {
        Ok(self.storage.get_job_json(key)?)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Result<Vec<(JobKey, JobRecord)>, SchedulerError> {
        Ok(self.storage.list_jobs_json()?)
    }

    /// Drop a job record.
    pub fn remove(&self, key: &JobKey) -> Result<bool, SchedulerError> {
        Ok(self.storage.delete_job(key)?)
    }

    /// Take ownership of a due job. `None` when it is not due or already owned.
    pub fn claim(&self, key: &JobKey, worker: &str, now: DateTime<Utc>) -> Result<Option<JobRecord>, SchedulerError> {
        let _lock = self.claim_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = self
            .get(key)?
            .ok_or_else(|| SchedulerError::JobNotFound(key.job_id()))?;
        if !record.is_due(now) {
            return Ok(None);
        }
        record.status = JobStatus::Running;
        record.worker = Some(worker.to_string());
        self.storage.put_job_json(key, &record)?;
        debug!(job_id = %record.id, worker, "Job claimed");
        Ok(Some(record))
    }

    /// Release every job left running under `worker`, e.g. by a process that
    /// died mid-run. Persisted state is kept, so the next run resumes at the
    /// last completed step. Returns the number of jobs released.
    pub fn recover(&self, worker: &str) -> Result<usize, SchedulerError> {
        let _lock = self.claim_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut released = 0;
        for (key, mut record) in self.list()? {
            if record.status != JobStatus::Running || record.worker.as_deref() != Some(worker) {
                continue;
            }
            record.release();
            self.storage.put_job_json(&key, &record)?;
            released += 1;
        }
        if released > 0 {
            info!(worker, released, "Released stale job claims");
        }
        Ok(released)
    }

    /// Claim a job and run it until it completes or fails.
    ///
    /// State is persisted after setup and after every tick. A failing step
    /// goes through the retry policy. Returns `None` when the job could not
    /// be claimed.
    pub fn run_job(&self, key: &JobKey, worker: &str, now: DateTime<Utc>) -> Result<Option<JobStatus>, SchedulerError> {
        let Some(mut record) = self.claim(key, worker, now)? else {
            return Ok(None);
        };

        match self.drive(key, &mut record) {
            Ok(()) => {
                record.status = JobStatus::Completed;
                info!(
                    job_id = %record.id,
                    kind = record.payload.kind(),
                    steps = record.state.current_step(),
                    "Job completed"
                );
            }
            Err(SchedulerError::Job(err)) => {
                record.attempts += 1;
                record.last_error = Some(err.to_string());
                record
                    .state
                    .add_message(format!("Attempt {} failed: {err}", record.attempts));
                warn!(job_id = %record.id, attempts = record.attempts, error = %err, "Job step failed");

                match self
                    .retry
                    .decide(record.payload.kind(), err.status_code(), record.attempts, now)
                {
                    RetryDecision::Retry { next_run_at } => {
                        record.status = JobStatus::Waiting;
                        record.next_run_at = next_run_at;
                    }
                    RetryDecision::GiveUp => record.status = JobStatus::Broken,
                }
            }
            Err(other) => {
                record.release();
                if let Err(e) = self.storage.put_job_json(key, &record) {
                    warn!(job_id = %record.id, error = %e, "Could not release job claim");
                }
                return Err(other);
            }
        }

        record.worker = None;
        self.storage.put_job_json(key, &record)?;
        Ok(Some(record.status))
    }

    fn drive(&self, key: &JobKey, record: &mut JobRecord) -> Result<(), SchedulerError> {
        if !record.setup_done {
            record.payload.setup(&self.env, &mut record.state)?;
            record.setup_done = true;
            self.storage.put_job_json(key, record)?;
        }
        while !record.state.is_complete() {
            record.payload.process(&self.env, &mut record.state)?;
            self.storage.put_job_json(key, record)?;
        }
        Ok(())
    }

    /// Run every job that is due at `now`, in enqueue order.
    pub fn run_due(&self, now: DateTime<Utc>) -> Result<QueueRunSummary, SchedulerError> {
        self.run_due_as(&self.worker_id, now)
    }

    /// [`Self::run_due`] with an explicit owner marker.
    pub fn run_due_as(&self, worker: &str, now: DateTime<Utc>) -> Result<QueueRunSummary, SchedulerError> {
        let mut summary = QueueRunSummary::default();
        let due: Vec<JobKey> = self
            .list()?
            .into_iter()
            .filter(|(_, record)| record.is_due(now))
            .map(|(key, _)| key)
            .collect();

        for key in due {
            let Some(status) = self.run_job(&key, worker, now)? else {
                continue;
            };
            summary.ran += 1;
            match status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Waiting => summary.rescheduled += 1,
                JobStatus::Broken => summary.broken += 1,
                JobStatus::Queued | JobStatus::Running => {}
            }
        }

        if summary.ran > 0 {
            info!(
                ran = summary.ran,
                completed = summary.completed,
                rescheduled = summary.rescheduled,
                broken = summary.broken,
                "Queue pass complete"
            );
        }
        Ok(summary)
    }
}
