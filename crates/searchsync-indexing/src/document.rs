//! Documents backed by record store records.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use searchsync_types::{
    resolve_path, DependencyTracking, Document, DocumentError, DocumentHandle, DocumentHooks,
    DocumentRef, Field, FieldValue, IndexEvent, Record, RecordId, View,
};

use crate::context::RecordContext;
use crate::dependency::discover_dependents;

/// Attribute that hides a record from search when `false`.
pub const SHOW_IN_SEARCH: &str = "show_in_search";
/// Attribute that marks a record as not publicly viewable when `false`.
pub const CAN_VIEW: &str = "can_view";

/// A document for one record.
#[derive(Clone)]
pub struct RecordDocument {
    ctx: Arc<RecordContext>,
    record: Record,
    base_type: String,
}

impl std::fmt::Debug for RecordDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordDocument")
            .field("type", &self.record.type_name)
            .field("id", &self.record.id)
            .finish()
    }
}

impl RecordDocument {
    pub fn new(ctx: Arc<RecordContext>, record: Record) -> Self {
        let base_type = ctx
            .store()
            .registry()
            .base_type(&record.type_name)
            .to_string();
        Self {
            ctx,
            record,
            base_type,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn context(&self) -> &Arc<RecordContext> {
        &self.ctx
    }

    fn live_record(&self) -> Result<Option<Record>, DocumentError> {
        Ok(self
            .ctx
            .store()
            .get(View::Live, &self.record.type_name, self.record.id)?)
    }
}

impl Document for RecordDocument {
    fn source_type(&self) -> &str {
        &self.record.type_name
    }

    fn base_type(&self) -> &str {
        &self.base_type
    }

    fn source_id(&self) -> RecordId {
        self.record.id
    }

    fn field_value(&self, field: &Field) -> Result<FieldValue, DocumentError> {
        let resolved = resolve_path(
            self.ctx.store().as_ref(),
            View::Live,
            &self.record,
            field.source_path(),
        )?;
        Ok(resolved.into_value())
    }

    fn should_index(&self) -> Result<bool, DocumentError> {
        Ok(self.is_eligible()? && !self.ctx.config().indexes_for_document(self)?.is_empty())
    }

    fn is_eligible(&self) -> Result<bool, DocumentError> {
        let config = self.ctx.config();
        if !config.is_indexed(self.source_type()) {
            return Ok(false);
        }

        // Only the published state is searchable
        let Some(live) = self.live_record()? else {
            debug!(id = %self.identifier(), "Not indexable: no live version");
            return Ok(false);
        };

        if live.flag_denies(SHOW_IN_SEARCH) || live.flag_denies(CAN_VIEW) {
            debug!(id = %self.identifier(), "Not indexable: hidden from search");
            return Ok(false);
        }

        for check in self.ctx.checks() {
            if !check.allows(&live)? {
                debug!(id = %self.identifier(), "Not indexable: vetoed by check");
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn is_versioned(&self) -> bool {
        self.ctx.store().registry().is_versioned(&self.record.type_name)
    }

    fn to_ref(&self) -> DocumentRef {
        let reference = DocumentRef::new(&self.record.type_name, self.record.id);
        if self.is_versioned() {
            reference.with_archive_fallback()
        } else {
            reference
        }
    }

    fn dependency_tracking(&self) -> Option<&dyn DependencyTracking> {
        Some(self)
    }

    fn hooks(&self) -> Option<&dyn DocumentHooks> {
        Some(self)
    }
}

impl DependencyTracking for RecordDocument {
    fn dependent_documents_in(&self, view: View) -> Result<Vec<DocumentHandle>, DocumentError> {
        discover_dependents(&self.ctx, self, view)
    }
}

impl DocumentHooks for RecordDocument {
    fn on_index_event(&self, event: IndexEvent, index: &str) -> Result<(), DocumentError> {
        if event == IndexEvent::AfterAdd {
            debug!(id = %self.identifier(), index, "Marking record as indexed");
            self.ctx
                .store()
                .mark_indexed(&self.record.type_name, self.record.id, Utc::now())?;
        }
        Ok(())
    }
}
