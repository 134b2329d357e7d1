//! Sweep every registered fetcher into every active index.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use searchsync_indexing::{IndexOperation, Indexer, IndexerStats};

use super::BatchJob;
use crate::env::JobEnvironment;
use crate::error::JobError;
use crate::state::{steps_for, JobState};

/// Full reindex, one fetcher page per tick.
///
/// Pages are indexed without dependency cascade: every searchable type is
/// swept anyway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReindexJob {
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Fetcher types in sweep order, fixed at setup
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    fetch_index: usize,
    #[serde(default)]
    fetch_offset: usize,
}

impl ReindexJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// A fetcher yields subtypes too, so the smallest size in the family wins.
    fn batch_for(&self, env: &JobEnvironment, type_name: &str) -> Result<usize, JobError> {
        match self.batch_size {
            Some(size) => Ok(env.config().resolve_batch_size(Some(size), type_name, None)?),
            None => Ok(env.config().lowest_batch_size_for_family(type_name, None)),
        }
    }

    fn next_fetcher(&mut self) {
        self.fetch_index += 1;
        self.fetch_offset = 0;
    }
}

impl BatchJob for ReindexJob {
    fn kind(&self) -> &'static str {
        "reindex"
    }

    fn setup(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        self.types = env.fetchers().types().map(str::to_string).collect();
        self.fetch_index = 0;
        self.fetch_offset = 0;

        let mut total = 0;
        for type_name in &self.types {
            let Some(fetcher) = env.fetchers().fetcher_for(type_name) else {
                continue;
            };
            let count = fetcher.total_count()?;
            total += steps_for(count, self.batch_for(env, type_name)?);
        }
        state.total_steps = total.max(1);
        info!(
            types = ?self.types,
            total_steps = state.total_steps,
            "Reindex job set up"
        );
        Ok(())
    }

    fn process(&mut self, env: &JobEnvironment, state: &mut JobState) -> Result<(), JobError> {
        if state.is_complete() {
            return Ok(());
        }

        let Some(type_name) = self.types.get(self.fetch_index).cloned() else {
            state.complete();
            return Ok(());
        };
        let Some(fetcher) = env.fetchers().fetcher_for(&type_name) else {
            warn!(type_name = %type_name, "No fetcher registered, skipping type");
            self.next_fetcher();
            if self.fetch_index >= self.types.len() {
                state.complete();
            }
            return Ok(());
        };

        let batch_size = self.batch_for(env, &type_name)?;
        let page = fetcher.fetch_page(batch_size, self.fetch_offset)?;
        if page.is_empty() {
            debug!(type_name = %type_name, offset = self.fetch_offset, "Fetcher exhausted");
            self.next_fetcher();
        } else {
            let mut stats = IndexerStats::default();
            for index in env.config().index_names() {
                let mut indexer = Indexer::new(
                    env.indexing().clone(),
                    index,
                    page.clone(),
                    IndexOperation::Add,
                    batch_size,
                    false,
                )?;
                stats.merge(indexer.run()?);
            }
            state.add_message(format!(
                "{type_name} {}..{}: {} added, {} removed",
                self.fetch_offset,
                self.fetch_offset + page.len(),
                stats.added,
                stats.removed
            ));
            state.advance();

            self.fetch_offset += page.len();
            if page.len() < batch_size {
                self.next_fetcher();
            }
        }

        if self.fetch_index >= self.types.len() {
            info!(steps = state.current_step(), "Reindex complete");
            state.complete();
        }
        Ok(())
    }
}
