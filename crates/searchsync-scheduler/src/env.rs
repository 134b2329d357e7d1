//! Everything a job needs to run.

use std::sync::Arc;

use searchsync_config::IndexConfiguration;
use searchsync_indexing::{register_record_fetchers, IndexingEnv, RecordContext};
use searchsync_search::{FetcherRegistry, SearchBackend};
use searchsync_types::{ClearIndexSettings, DocumentHandle, DocumentRef, RecordStore};

use crate::error::JobError;
use crate::jobs::Tombstone;

/// Record context, indexing environment and fetchers shared by jobs.
#[derive(Debug, Clone)]
pub struct JobEnvironment {
    records: Arc<RecordContext>,
    indexing: IndexingEnv,
    fetchers: Arc<FetcherRegistry>,
    clear_index: ClearIndexSettings,
}

impl JobEnvironment {
    /// Wire a store, backend and configuration together, registering a
    /// record fetcher for every searchable base type.
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn SearchBackend>,
        config: Arc<IndexConfiguration>,
        clear_index: ClearIndexSettings,
    ) -> Self {
        let records = Arc::new(RecordContext::new(store, Arc::clone(&config)));
        Self::with_context(records, backend, clear_index)
    }

    /// Like [`Self::new`], for a context that already carries indexability checks.
    pub fn with_context(
        records: Arc<RecordContext>,
        backend: Arc<dyn SearchBackend>,
        clear_index: ClearIndexSettings,
    ) -> Self {
        let config = Arc::clone(records.config());
        let mut fetchers = FetcherRegistry::new(Arc::clone(config.registry()));
        register_record_fetchers(&mut fetchers, &records);
        let fetchers = Arc::new(fetchers);
        let indexing = IndexingEnv::new(backend, config, Arc::clone(&fetchers));
        Self {
            records,
            indexing,
            fetchers,
            clear_index,
        }
    }

    pub fn records(&self) -> &Arc<RecordContext> {
        &self.records
    }

    pub fn indexing(&self) -> &IndexingEnv {
        &self.indexing
    }

    pub fn config(&self) -> &Arc<IndexConfiguration> {
        self.indexing.config()
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        self.indexing.backend()
    }

    pub fn fetchers(&self) -> &Arc<FetcherRegistry> {
        &self.fetchers
    }

    pub fn clear_index(&self) -> &ClearIndexSettings {
        &self.clear_index
    }

    /// Rebuild the documents behind `references`, in order. Records that are
    /// gone everywhere become tombstones so they can still be removed.
    pub fn rehydrate_all(&self, references: &[DocumentRef]) -> Result<Vec<DocumentHandle>, JobError> {
        let registry = self.config().registry();
        references
            .iter()
            .map(|reference| {
                Ok(match self.records.rehydrate(reference)? {
                    Some(document) => document,
                    None => Tombstone::handle(registry, reference),
                })
            })
            .collect()
    }
}
