//! Re-evaluate the dependents of a record that was unpublished or deleted.
//!
//! Dependents are discovered in the archived view as of just before the
//! removal, because the current graph no longer links them to the removed
//! record. Each dependent is then rebuilt from its current state and run
//! through an `Add` pass, which drops the ones that stopped qualifying.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use searchsync_indexing::{IndexOperation, Indexer, IndexerStats};
use searchsync_types::{ConfigError, DocumentRef, View};

use super::BatchJob;
use crate::env::JobEnvironment;
use crate::error::JobError;
use crate::state::{steps_for, JobState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveCascadeJob {
    pub document: DocumentRef,
    /// Instant whose archived graph still links the dependents
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    dependents: Vec<DocumentRef>,
    #[serde(default)]
    resolved_batch_size: usize,
    #[serde(default)]
    offset: usize,
}

impl RemoveCascadeJob {
    pub fn new(document: DocumentRef, as_of: DateTime<Utc>) -> Self {
        Self {
            document,
            as_of,
            batch_size: None,
            dependents: Vec::new(),
            resolved_batch_size: 0,
            offset: 0,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Dependents found at setup.
    pub fn dependents(&self) -> &[DocumentRef] {
        &self.dependents
    }

    fn resolve_batch_size(&self, env: &JobEnvironment) -> Result<usize, JobError> {
        let config = env.config();
        match self.batch_size {
            Some(0) => Err(ConfigError::InvalidBatchSize(0).into()),
            Some(size) => Ok(size),
            None => Ok(self
                .dependents
                .iter()
                .map(|d| config.lowest_batch_size_for_type(&d.source_type, None))
                .min()
                .unwrap_or_else(|| config.default_batch_size())),
        }
    }
}

impl BatchJob for RemoveCascadeJob {
    fn kind(&self) -> &'static str {
        "remove_cascade"
    }

    fn setup(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        let versioned = env.config().registry().is_versioned(&self.document.source_type);
        let mut reference = self.document.clone();
        if versioned {
            reference.fallback_to_archive = true;
        }

        let Some(document) = env.records().rehydrate(&reference)? else {
            if versioned {
                state.add_message(format!("{} is gone, nothing to cascade", self.document));
                state.complete();
                return Ok(());
            }
            return Err(JobError::MissingRecord(self.document.clone()));
        };

        let found = match document.dependency_tracking() {
            Some(tracking) => tracking.dependent_documents_in(View::Archived(self.as_of))?,
            None => Vec::new(),
        };
        let identifier = document.identifier();
        self.dependents = found
            .iter()
            .filter(|d| d.identifier() != identifier)
            .map(|d| d.to_ref().with_archive_fallback())
            .collect();
        self.resolved_batch_size = self.resolve_batch_size(env)?;
        self.offset = 0;
        state.total_steps = steps_for(self.dependents.len(), self.resolved_batch_size);

        info!(
            document = %self.document,
            as_of = %self.as_of,
            dependents = self.dependents.len(),
            total_steps = state.total_steps,
            "Removal cascade set up"
        );
        if self.dependents.is_empty() {
            state.add_message(format!("{} has no dependents", self.document));
            state.complete();
        }
        Ok(())
    }

    fn process(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        if state.is_complete() {
            return Ok(());
        }

        let end = (self.offset + self.resolved_batch_size).min(self.dependents.len());
        let documents = env.rehydrate_all(&self.dependents[self.offset..end])?;

        let mut stats = IndexerStats::default();
        for index in env.config().index_names() {
            let mut indexer = Indexer::new(
                env.indexing().clone(),
                index,
                documents.clone(),
                IndexOperation::Add,
                self.resolved_batch_size,
                false,
            )?;
            stats.merge(indexer.run()?);
        }
        debug!(
            document = %self.document,
            offset = self.offset,
            end,
            added = stats.added,
            removed = stats.removed,
            "Re-evaluated dependents"
        );
        state.add_message(format!(
            "Step {}/{}: re-evaluated {} dependents of {} ({} kept, {} removed)",
            state.current_step() + 1,
            state.total_steps,
            end - self.offset,
            self.document,
            stats.added,
            stats.removed
        ));

        self.offset = end;
        state.advance();
        if self.offset >= self.dependents.len() {
            state.complete();
        }
        Ok(())
    }
}
