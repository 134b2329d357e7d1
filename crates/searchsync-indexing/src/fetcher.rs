//! Fetchers backed by the record store.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use searchsync_search::{DocumentPayload, Fetcher, FetcherRegistry, SearchError};
use searchsync_types::{
    DocumentError, DocumentHandle, DocumentRef, View, RECORD_ID_FIELD, SOURCE_TYPE_FIELD,
};

use crate::context::RecordContext;

/// Pages through the live records of one type, subtypes included.
#[derive(Debug, Clone)]
pub struct RecordFetcher {
    ctx: Arc<RecordContext>,
    type_name: String,
}

impl RecordFetcher {
    pub fn new(ctx: Arc<RecordContext>, type_name: impl Into<String>) -> Self {
        Self {
            ctx,
            type_name: type_name.into(),
        }
    }
}

impl Fetcher for RecordFetcher {
    fn source_type(&self) -> &str {
        &self.type_name
    }

    fn total_count(&self) -> Result<usize, SearchError> {
        let count = self
            .ctx
            .store()
            .count(View::Live, &self.type_name)
            .map_err(DocumentError::from)?;
        Ok(count)
    }

    fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<DocumentHandle>, SearchError> {
        let records = self
            .ctx
            .store()
            .query(View::Live, &self.type_name, limit, offset)
            .map_err(DocumentError::from)?;
        debug!(
            source_type = %self.type_name,
            limit,
            offset,
            fetched = records.len(),
            "Fetched page"
        );
        Ok(records
            .into_iter()
            .map(|record| Arc::new(self.ctx.document_from_record(record)) as DocumentHandle)
            .collect())
    }

    fn build_from_payload(&self, payload: &DocumentPayload) -> Result<Option<DocumentHandle>, SearchError> {
        let source_type = payload.get(SOURCE_TYPE_FIELD).and_then(Value::as_str);
        let id = payload.get(RECORD_ID_FIELD).and_then(Value::as_u64);
        let (Some(source_type), Some(id)) = (source_type, id) else {
            return Ok(None);
        };

        let mut reference = DocumentRef::new(source_type, id);
        if self.ctx.store().registry().is_versioned(source_type) {
            reference = reference.with_archive_fallback();
        }
        Ok(self.ctx.rehydrate(&reference)?)
    }
}

/// Register one [`RecordFetcher`] per searchable base type.
pub fn register_record_fetchers(fetchers: &mut FetcherRegistry, ctx: &Arc<RecordContext>) {
    for type_name in ctx.config().searchable_base_classes() {
        fetchers.register(Arc::new(RecordFetcher::new(Arc::clone(ctx), type_name)));
    }
}
