//! The document abstraction and its optional capabilities.
//!
//! A [`Document`] is the unit sent to or removed from an index. Collaborators
//! that can report dependents or want lifecycle callbacks expose them through
//! [`Document::dependency_tracking`] and [`Document::hooks`]; callers probe for
//! the capability instead of assuming it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::field::Field;
use crate::record::RecordId;
use crate::store::View;
use crate::value::FieldValue;

/// Payload key carrying the document identifier.
pub const ID_FIELD: &str = "id";
/// Meta key carrying the concrete source type.
pub const SOURCE_TYPE_FIELD: &str = "source_type";
/// Meta key carrying the base type of the source record.
pub const BASE_TYPE_FIELD: &str = "record_base_type";
/// Meta key carrying the source record id.
pub const RECORD_ID_FIELD: &str = "record_id";

/// Shared handle to a document.
pub type DocumentHandle = Arc<dyn Document>;

/// Build the identifier for a record: `{base_type}_{id}`, lowercased, with
/// namespace separators flattened to underscores.
pub fn document_identifier(base_type: &str, id: RecordId) -> String {
    let base = base_type.replace("::", "_").replace('\\', "_").to_lowercase();
    format!("{}_{}", base, id)
}

/// Indexing lifecycle events delivered to [`DocumentHooks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    BeforeAdd,
    AfterAdd,
    BeforeRemove,
    AfterRemove,
}

/// A document destined for a search index.
pub trait Document: Send + Sync + fmt::Debug {
    /// Concrete type of the source record.
    fn source_type(&self) -> &str;

    /// Root type of the source record's inheritance chain.
    fn base_type(&self) -> &str;

    fn source_id(&self) -> RecordId;

    /// Stable identifier; depends only on base type and id.
    fn identifier(&self) -> String {
        document_identifier(self.base_type(), self.source_id())
    }

    /// Bookkeeping fields merged into every payload.
    fn meta(&self) -> BTreeMap<String, FieldValue> {
        let mut meta = BTreeMap::new();
        meta.insert(SOURCE_TYPE_FIELD.to_string(), FieldValue::from(self.source_type()));
        meta.insert(BASE_TYPE_FIELD.to_string(), FieldValue::from(self.base_type()));
        meta.insert(RECORD_ID_FIELD.to_string(), FieldValue::Int(self.source_id() as i64));
        meta
    }

    /// Value of one projected field.
    fn field_value(&self, field: &Field) -> Result<FieldValue, DocumentError>;

    /// Whether the document currently qualifies for indexing.
    fn should_index(&self) -> Result<bool, DocumentError>;

    /// `should_index` without the per-document membership filters, for
    /// callers that resolve membership themselves.
    fn is_eligible(&self) -> Result<bool, DocumentError> {
        self.should_index()
    }

    /// Whether the source type keeps draft/live versions.
    fn is_versioned(&self) -> bool {
        false
    }

    /// Persistable reference from which the document can be rebuilt.
    fn to_ref(&self) -> DocumentRef {
        DocumentRef::new(self.source_type(), self.source_id())
    }

    fn dependency_tracking(&self) -> Option<&dyn DependencyTracking> {
        None
    }

    fn hooks(&self) -> Option<&dyn DocumentHooks> {
        None
    }
}

/// Capability: report documents that must be re-evaluated when this one changes.
pub trait DependencyTracking {
    /// Dependents as seen in `view`.
    fn dependent_documents_in(&self, view: View) -> Result<Vec<DocumentHandle>, DocumentError>;

    /// Dependents in the published graph.
    fn dependent_documents(&self) -> Result<Vec<DocumentHandle>, DocumentError> {
        self.dependent_documents_in(View::Live)
    }
}

/// Capability: observe add/remove around the backend call.
pub trait DocumentHooks {
    fn on_index_event(&self, event: IndexEvent, index: &str) -> Result<(), DocumentError>;
}

/// Plain data reference to a document, stored in persisted jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub source_type: String,
    pub id: RecordId,
    /// Fall back to the last archived version when the record is gone.
    #[serde(default)]
    pub fallback_to_archive: bool,
}

impl DocumentRef {
    pub fn new(source_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            source_type: source_type.into(),
            id,
            fallback_to_archive: false,
        }
    }

    pub fn with_archive_fallback(mut self) -> Self {
        self.fallback_to_archive = true;
        self
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed {
        id: RecordId,
    }

    impl Document for Fixed {
        fn source_type(&self) -> &str {
            "NewsArticle"
        }

        fn base_type(&self) -> &str {
            "Page"
        }

        fn source_id(&self) -> RecordId {
            self.id
        }

        fn field_value(&self, _field: &Field) -> Result<FieldValue, DocumentError> {
            Ok(FieldValue::Null)
        }

        fn should_index(&self) -> Result<bool, DocumentError> {
            Ok(true)
        }
    }

    #[test]
    fn test_identifier_uses_base_type() {
        let doc = Fixed { id: 12 };
        assert_eq!(doc.identifier(), "page_12");
        assert_eq!(doc.identifier(), doc.identifier());
    }

    #[test]
    fn test_identifier_flattens_namespaces() {
        assert_eq!(document_identifier("App::Models::Page", 3), "app_models_page_3");
        assert_eq!(document_identifier("App\\Page", 3), "app_page_3");
    }

    #[test]
    fn test_meta_fields() {
        let meta = Fixed { id: 4 }.meta();
        assert_eq!(meta.get(SOURCE_TYPE_FIELD), Some(&FieldValue::from("NewsArticle")));
        assert_eq!(meta.get(BASE_TYPE_FIELD), Some(&FieldValue::from("Page")));
        assert_eq!(meta.get(RECORD_ID_FIELD), Some(&FieldValue::Int(4)));
    }

    #[test]
    fn test_capabilities_absent_by_default() {
        let doc = Fixed { id: 1 };
        assert!(doc.dependency_tracking().is_none());
        assert!(doc.hooks().is_none());
    }

    #[test]
    fn test_document_ref_serde() {
        let reference = DocumentRef::new("Tag", 7).with_archive_fallback();
        let json = serde_json::to_string(&reference).unwrap();
        let decoded: DocumentRef = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, reference);
        assert_eq!(reference.to_string(), "Tag#7");

        let decoded: DocumentRef =
            serde_json::from_str(r#"{"source_type":"Tag","id":1}"#).unwrap();
        assert!(!decoded.fallback_to_archive);
    }
}
