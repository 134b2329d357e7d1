//! Add or remove a fixed list of documents in one index.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use searchsync_indexing::{IndexOperation, Indexer};
use searchsync_types::{ConfigError, DocumentRef};

use super::BatchJob;
use crate::env::JobEnvironment;
use crate::error::JobError;
use crate::state::{steps_for, JobState};

/// Index job over persisted document references.
///
/// Each tick rehydrates the next chunk of references and runs it through the
/// indexer, so only the references are persisted between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexJob {
    pub index: String,
    pub documents: Vec<DocumentRef>,
    pub operation: IndexOperation,
    #[serde(default)]
    pub batch_size: Option<usize>,
    pub process_dependencies: bool,
    /// Resolved at setup when `batch_size` is unset
    #[serde(default)]
    resolved_batch_size: usize,
    #[serde(default)]
    offset: usize,
}

impl IndexJob {
    pub fn new(
        index: impl Into<String>,
        documents: Vec<DocumentRef>,
        operation: IndexOperation,
        process_dependencies: bool,
    ) -> Self {
        Self {
            index: index.into(),
            documents,
            operation,
            batch_size: None,
            process_dependencies,
            resolved_batch_size: 0,
            offset: 0,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Number of references already handed to the indexer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Explicit size, else the smallest size any of the document types
    /// declares for this index.
    fn resolve_batch_size(&self, env: &JobEnvironment) -> Result<usize, JobError> {
        let config = env.config();
        match self.batch_size {
            Some(0) => Err(ConfigError::InvalidBatchSize(0).into()),
            Some(size) => Ok(size),
            None => Ok(self
                .documents
                .iter()
                .map(|d| config.lowest_batch_size_for_type(&d.source_type, Some(&self.index)))
                .min()
                .unwrap_or_else(|| config.default_batch_size())),
        }
    }
}

impl BatchJob for IndexJob {
    fn kind(&self) -> &'static str {
        "index"
    }

    fn setup(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        self.resolved_batch_size = self.resolve_batch_size(env)?;
        self.offset = 0;
        state.total_steps = steps_for(self.documents.len(), self.resolved_batch_size);
        info!(
            index = %self.index,
            operation = ?self.operation,
            documents = self.documents.len(),
            batch_size = self.resolved_batch_size,
            total_steps = state.total_steps,
            "Index job set up"
        );
        if self.documents.is_empty() {
            state.add_message("No documents to index");
            state.complete();
        }
        Ok(())
    }

    fn process(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        if state.is_complete() {
            return Ok(());
        }

        let end = (self.offset + self.resolved_batch_size).min(self.documents.len());
        let documents = env.rehydrate_all(&self.documents[self.offset..end])?;
        let mut indexer = Indexer::new(
            env.indexing().clone(),
            self.index.clone(),
            documents,
            self.operation,
            self.resolved_batch_size,
            self.process_dependencies,
        )?;
        let stats = indexer.run()?;

        debug!(
            index = %self.index,
            offset = self.offset,
            end,
            added = stats.added,
            removed = stats.removed,
            "Index job step"
        );
        state.add_message(format!(
            "Step {}/{}: {} added, {} removed, {} cascaded in '{}'",
            state.current_step() + 1,
            state.total_steps,
            stats.added,
            stats.removed,
            stats.cascaded,
            self.index
        ));

        self.offset = end;
        state.advance();
        if self.offset >= self.documents.len() {
            state.complete();
        }
        Ok(())
    }
}
