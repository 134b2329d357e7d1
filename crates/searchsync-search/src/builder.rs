//! Converts documents to and from the backend payload shape.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use searchsync_config::IndexConfiguration;
use searchsync_types::{
    Document, DocumentHandle, FieldValue, BASE_TYPE_FIELD, ID_FIELD, RECORD_ID_FIELD,
    SOURCE_TYPE_FIELD,
};

use crate::backend::{DocumentPayload, SearchBackend};
use crate::error::SearchError;
use crate::fetcher::FetcherRegistry;
use crate::truncate::truncate_payload;

/// Payload keys that truncation must leave alone.
pub const PROTECTED_FIELDS: &[&str] = &[ID_FIELD, SOURCE_TYPE_FIELD, BASE_TYPE_FIELD, RECORD_ID_FIELD];

/// Builds payloads for one backend under one index configuration.
#[derive(Clone)]
pub struct DocumentBuilder {
    backend: Arc<dyn SearchBackend>,
    config: Arc<IndexConfiguration>,
    fetchers: Arc<FetcherRegistry>,
}

impl DocumentBuilder {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        config: Arc<IndexConfiguration>,
        fetchers: Arc<FetcherRegistry>,
    ) -> Self {
        Self {
            backend,
            config,
            fetchers,
        }
    }

    /// Byte budget: configured override, else the backend's limit.
    pub fn max_document_size(&self) -> Option<usize> {
        self.config
            .max_document_size()
            .or_else(|| self.backend.max_document_size())
    }

    fn base_payload(document: &dyn Document) -> DocumentPayload {
        let mut payload = DocumentPayload::new();
        payload.insert(ID_FIELD.to_string(), Value::String(document.identifier()));
        for (name, value) in document.meta() {
            payload.insert(name, value.to_json());
        }
        payload
    }

    /// Payload for adding `document` to `index`: id, meta, then the fields
    /// projected for the document's type in that index.
    pub fn to_payload(&self, document: &dyn Document, index: &str) -> Result<DocumentPayload, SearchError> {
        let identifier = document.identifier();
        let mut payload = Self::base_payload(document);

        for field in self.config.fields_for_index(index, document.source_type()) {
            let name = field.search_name();
            self.backend.validate_field_name(name)?;

            let value = document.field_value(&field)?;
            validate_value(&identifier, name, &value)?;
            payload.insert(name.to_string(), value.to_json());
        }

        if let Some(max_size) = self.max_document_size() {
            let report = truncate_payload(&mut payload, max_size, PROTECTED_FIELDS)?;
            if report.truncated() {
                warn!(
                    id = %identifier,
                    original = report.original_size,
                    truncated = report.final_size,
                    fields = ?report.fields,
                    "Truncated oversized document"
                );
            }
        }

        Ok(payload)
    }

    /// Payload for removal: id and meta only.
    pub fn to_removal_payload(&self, document: &dyn Document) -> DocumentPayload {
        Self::base_payload(document)
    }

    /// Rebuild a document from a stored payload.
    ///
    /// `None` when the payload carries no source type, no fetcher serves
    /// that type, or the record is gone.
    pub fn from_payload(&self, payload: &DocumentPayload) -> Result<Option<DocumentHandle>, SearchError> {
        let Some(source_type) = payload.get(SOURCE_TYPE_FIELD).and_then(Value::as_str) else {
            debug!("Payload has no source type");
            return Ok(None);
        };
        let Some(fetcher) = self.fetchers.fetcher_for(source_type) else {
            debug!(source_type, "No fetcher for source type");
            return Ok(None);
        };
        fetcher.build_from_payload(payload)
    }
}

/// Only scalars and lists of scalars can be indexed.
fn validate_value(identifier: &str, field: &str, value: &FieldValue) -> Result<(), SearchError> {
    let invalid = |reason: &str| SearchError::InvalidFieldValue {
        identifier: identifier.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    };

    match value {
        FieldValue::Map(_) => Err(invalid("associative values are not supported")),
        FieldValue::List(items) if !items.iter().all(FieldValue::is_scalar) => {
            Err(invalid("lists may only contain scalar values"))
        }
        _ => Ok(()),
    }
}
