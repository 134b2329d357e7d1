//! Delete every document from one index, a batch per tick.
//!
//! Backends often delete asynchronously, so a non-zero count after the
//! planned number of steps is not an error by itself. Once the steps are
//! used up the job polls the count a bounded number of times before giving
//! up with [`JobError::ClearIncomplete`].

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use searchsync_types::ConfigError;

use super::BatchJob;
use crate::env::JobEnvironment;
use crate::error::JobError;
use crate::state::{steps_for, JobState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearIndexJob {
    pub index: String,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl ClearIndexJob {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    fn effective_batch_size(&self, env: &JobEnvironment) -> Result<usize, JobError> {
        match self.batch_size {
            Some(0) => Err(ConfigError::InvalidBatchSize(0).into()),
            Some(size) => Ok(size),
            None => Ok(env.config().default_batch_size()),
        }
    }

    /// Re-read the count until it reaches zero or the attempts run out.
    fn await_empty(&self, env: &JobEnvironment, backend_index: &str) -> Result<usize, JobError> {
        let settings = env.clear_index();
        let mut delay = Constant::new(Duration::from_millis(settings.poll_delay_ms));
        let mut remaining = 0;
        for attempt in 1..=settings.poll_attempts {
            if let Some(wait) = delay.next_backoff() {
                std::thread::sleep(wait);
            }
            remaining = env.backend().document_count(backend_index)?;
            debug!(index = %self.index, attempt, remaining, "Polled cleared index");
            if remaining == 0 {
                break;
            }
        }
        Ok(remaining)
    }
}

impl BatchJob for ClearIndexJob {
    fn kind(&self) -> &'static str {
        "clear_index"
    }

    fn setup(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        let batch_size = self.effective_batch_size(env)?;
        let backend_index = env.config().backend_index_name(&self.index);
        let count = env.backend().document_count(&backend_index)?;
        state.total_steps = steps_for(count, batch_size).max(1);
        info!(
            index = %backend_index,
            count,
            batch_size,
            total_steps = state.total_steps,
            "Clear index job set up"
        );
        Ok(())
    }

    fn process(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        if state.is_complete() {
            return Ok(());
        }

        let batch_size = self.effective_batch_size(env)?;
        let backend_index = env.config().backend_index_name(&self.index);
        let before = env.backend().document_count(&backend_index)?;
        if before == 0 {
            state.add_message(format!("Index '{backend_index}' is empty"));
            state.complete();
            return Ok(());
        }

        if state.current_step() >= state.total_steps {
            warn!(
                index = %backend_index,
                remaining = before,
                "Documents remain after planned steps, polling"
            );
            let remaining = self.await_empty(env, &backend_index)?;
            if remaining > 0 {
                return Err(JobError::ClearIncomplete {
                    index: backend_index,
                    remaining,
                });
            }
            state.add_message(format!("Index '{backend_index}' is empty"));
            state.complete();
            return Ok(());
        }

        let removed = env.backend().clear_documents(&backend_index, batch_size)?;
        let after = env.backend().document_count(&backend_index)?;
        state.add_message(format!(
            "Step {}/{}: {before} documents before, {after} after ({removed} removed)",
            state.current_step() + 1,
            state.total_steps
        ));
        state.advance();
        debug!(index = %backend_index, before, after, removed, "Cleared batch");

        if after == 0 {
            info!(index = %backend_index, steps = state.current_step(), "Index cleared");
            state.complete();
        }
        Ok(())
    }
}
