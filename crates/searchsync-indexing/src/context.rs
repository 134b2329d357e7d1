//! Shared context for building documents from records.

use std::sync::Arc;

use tracing::debug;

use searchsync_config::IndexConfiguration;
use searchsync_types::{
    DocumentError, DocumentHandle, DocumentRef, Record, RecordId, RecordStore, View,
};

use crate::document::RecordDocument;

/// Vote on whether a record may be indexed, on top of the built-in rules.
pub trait IndexabilityCheck: Send + Sync {
    fn allows(&self, record: &Record) -> Result<bool, DocumentError>;
}

/// Record store plus index configuration, shared by every [`RecordDocument`].
pub struct RecordContext {
    store: Arc<dyn RecordStore>,
    config: Arc<IndexConfiguration>,
    checks: Vec<Arc<dyn IndexabilityCheck>>,
}

impl std::fmt::Debug for RecordContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordContext")
            .field("config", &self.config)
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl RecordContext {
    pub fn new(store: Arc<dyn RecordStore>, config: Arc<IndexConfiguration>) -> Self {
        Self {
            store,
            config,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Arc<dyn IndexabilityCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<IndexConfiguration> {
        &self.config
    }

    pub fn checks(&self) -> &[Arc<dyn IndexabilityCheck>] {
        &self.checks
    }

    /// Wrap a record already in hand.
    pub fn document_from_record(self: &Arc<Self>, record: Record) -> RecordDocument {
        RecordDocument::new(Arc::clone(self), record)
    }

    /// Current state of a record: live if published, else the draft.
    pub fn document(
        self: &Arc<Self>,
        type_name: &str,
        id: RecordId,
    ) -> Result<Option<RecordDocument>, DocumentError> {
        let record = match self.store.get(View::Live, type_name, id)? {
            Some(record) => Some(record),
            None => self.store.get(View::Draft, type_name, id)?,
        };
        Ok(record.map(|r| self.document_from_record(r)))
    }

    /// Rebuild a document from its persisted reference.
    ///
    /// Reads live, then draft, then (when the reference allows it) the last
    /// archived version. `None` when the record is gone everywhere.
    pub fn rehydrate(self: &Arc<Self>, reference: &DocumentRef) -> Result<Option<DocumentHandle>, DocumentError> {
        if let Some(document) = self.document(&reference.source_type, reference.id)? {
            return Ok(Some(Arc::new(document)));
        }
        if reference.fallback_to_archive {
            if let Some(record) = self.store.latest_version(&reference.source_type, reference.id)? {
                debug!(reference = %reference, "Rehydrated document from archive");
                return Ok(Some(Arc::new(self.document_from_record(record))));
            }
        }
        Ok(None)
    }
}
