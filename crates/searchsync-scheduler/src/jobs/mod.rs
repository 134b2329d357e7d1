//! Resumable batch jobs.
//!
//! Every job runs `setup` once and then `process` once per tick until its
//! [`JobState`] reports completion. Job structs carry their own cursors and
//! are persisted as part of the job record, so a tick can resume after a
//! restart.
//!
//! # Available Jobs
//!
//! - **index**: add or remove a list of documents in one index
//! - **reindex**: sweep every fetcher into every active index
//! - **clear_index**: delete all documents from one index
//! - **remove_cascade**: re-evaluate the dependents of a removed record

pub mod clear;
pub mod index;
pub mod reindex;
pub mod remove_cascade;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use searchsync_types::{
    Document, DocumentError, DocumentHandle, DocumentRef, Field, FieldValue, RecordId,
    TypeRegistry,
};

use crate::env::JobEnvironment;
use crate::error::JobError;
use crate::state::JobState;

pub use clear::ClearIndexJob;
pub use index::IndexJob;
pub use reindex::ReindexJob;
pub use remove_cascade::RemoveCascadeJob;

/// A unit of resumable work.
pub trait BatchJob {
    /// Kind name used by the retry allow-list.
    fn kind(&self) -> &'static str;

    /// Compute `total_steps` and any cursors. Runs once per job.
    fn setup(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError>;

    /// Perform one unit of work.
    fn process(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError>;
}

/// Persisted form of any job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Index(IndexJob),
    Reindex(ReindexJob),
    ClearIndex(ClearIndexJob),
    RemoveCascade(RemoveCascadeJob),
}

impl JobPayload {
    fn job(&mut self) -> &mut dyn BatchJob {
        match self {
            JobPayload::Index(job) => job,
            JobPayload::Reindex(job) => job,
            JobPayload::ClearIndex(job) => job,
            JobPayload::RemoveCascade(job) => job,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Index(job) => job.kind(),
            JobPayload::Reindex(job) => job.kind(),
            JobPayload::ClearIndex(job) => job.kind(),
            JobPayload::RemoveCascade(job) => job.kind(),
        }
    }

    pub fn setup(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        self.job().setup(env, state)
    }

    pub fn process(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        self.job().process(env, state)
    }

    /// Run `setup` and then `process` until complete, in the calling thread.
    pub fn run_to_completion(&mut self, env: &JobEnvironment) -> Result<JobState, JobError> {
        let mut state = JobState::new();
        self.setup(env, &mut state)?;
        while !state.is_complete() {
            self.process(env, &mut state)?;
        }
        Ok(state)
    }
}

impl From<IndexJob> for JobPayload {
    fn from(job: IndexJob) -> Self {
        JobPayload::Index(job)
    }
}

impl From<ReindexJob> for JobPayload {
    fn from(job: ReindexJob) -> Self {
        JobPayload::Reindex(job)
    }
}

impl From<ClearIndexJob> for JobPayload {
    fn from(job: ClearIndexJob) -> Self {
        JobPayload::ClearIndex(job)
    }
}

impl From<RemoveCascadeJob> for JobPayload {
    fn from(job: RemoveCascadeJob) -> Self {
        JobPayload::RemoveCascade(job)
    }
}

/// Stand-in for a record that no longer exists anywhere.
///
/// Never qualifies for indexing, so an `Add` pass removes it and a `Delete`
/// pass can still build its removal payload.
#[derive(Debug, Clone)]
pub struct Tombstone {
    source_type: String,
    base_type: String,
    id: RecordId,
}

impl Tombstone {
    pub fn new(registry: &TypeRegistry, reference: &DocumentRef) -> Self {
        Self {
            source_type: reference.source_type.clone(),
            base_type: registry.base_type(&reference.source_type).to_string(),
            id: reference.id,
        }
    }

    pub fn handle(registry: &TypeRegistry, reference: &DocumentRef) -> DocumentHandle {
        Arc::new(Self::new(registry, reference))
    }
}

impl Document for Tombstone {
    fn source_type(&self) -> &str {
        &self.source_type
    }

    fn base_type(&self) -> &str {
        &self.base_type
    }

    fn source_id(&self) -> RecordId {
        self.id
    }

    fn field_value(&self, _field: &Field) -> Result<FieldValue, DocumentError> {
        Ok(FieldValue::Null)
    }

    fn should_index(&self) -> Result<bool, DocumentError> {
        Ok(false)
    }
}
