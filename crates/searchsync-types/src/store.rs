//! Record store interface and relationship path resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DocumentError, StoreError};
use crate::record::{Record, RecordId};
use crate::registry::TypeRegistry;
use crate::value::FieldValue;

/// Path segment that always resolves to the record id.
pub const ID_SEGMENT: &str = "id";

/// Which state of the record graph a read observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum View {
    /// Latest written state, published or not
    Draft,
    /// Published state
    Live,
    /// Published state as it was at the given instant
    Archived(DateTime<Utc>),
}

/// Source of truth for records.
///
/// Every read takes an explicit [`View`]; the store never switches visible
/// state behind the caller's back.
pub trait RecordStore: Send + Sync {
    fn registry(&self) -> &TypeRegistry;

    /// Fetch one record of `type_name` (or a subtype).
    fn get(&self, view: View, type_name: &str, id: RecordId) -> Result<Option<Record>, StoreError>;

    /// Page through records of `type_name` and its subtypes, ordered by id.
    fn query(
        &self,
        view: View,
        type_name: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, StoreError>;

    fn count(&self, view: View, type_name: &str) -> Result<usize, StoreError>;

    /// Last known snapshot of a record, even if it has since been deleted.
    fn latest_version(&self, type_name: &str, id: RecordId) -> Result<Option<Record>, StoreError>;

    /// Records linked from `record` through `relation`, in link order.
    ///
    /// Links to records not visible in `view` are dropped.
    fn related(&self, view: View, record: &Record, relation: &str) -> Result<Vec<Record>, StoreError> {
        let def = self
            .registry()
            .relation(&record.type_name, relation)
            .ok_or_else(|| StoreError::UnknownRelation {
                type_name: record.type_name.clone(),
                relation: relation.to_string(),
            })?;

        let mut related = Vec::new();
        for id in record.linked_ids(relation) {
            if let Some(target) = self.get(view, &def.target, *id)? {
                related.push(target);
            }
        }
        Ok(related)
    }

    /// Bookkeeping after a record was sent to an index.
    fn mark_indexed(&self, _type_name: &str, _id: RecordId, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Outcome of walking a dot-separated path from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The path ended on an attribute
    Value(FieldValue),
    /// The path ended on a relation
    Records(Vec<Record>),
}

impl Resolved {
    /// Flatten into a field value; record lists become their ids.
    pub fn into_value(self) -> FieldValue {
        match self {
            Resolved::Value(value) => value,
            Resolved::Records(records) => {
                FieldValue::List(records.iter().map(|r| FieldValue::Int(r.id as i64)).collect())
            }
        }
    }
}

/// Walk `path` from `record`.
///
/// Each relation hop flattens into the list of reached records. A final
/// attribute yields a scalar when every hop was to-one, or a list of scalars
/// once any hop crossed a collection. A segment that is neither a relation nor
/// (in last position) an attribute of the type reached so far is a
/// configuration error.
pub fn resolve_path(
    store: &dyn RecordStore,
    view: View,
    record: &Record,
    path: &str,
) -> Result<Resolved, DocumentError> {
    let registry = store.registry();
    let segments: Vec<&str> = path.split('.').collect();
    let mut declared = record.type_name.clone();
    let mut current = vec![record.clone()];
    let mut collection = false;

    for (position, segment) in segments.iter().enumerate() {
        let last = position + 1 == segments.len();

        if let Some(relation) = registry.relation(&declared, segment) {
            let mut next = Vec::new();
            for owner in &current {
                next.extend(store.related(view, owner, segment)?);
            }
            collection |= relation.kind.is_collection();
            declared = relation.target.clone();
            current = next;
            continue;
        }

        if last && (*segment == ID_SEGMENT || registry.has_attribute(&declared, segment)) {
            let values: Vec<FieldValue> = current
                .iter()
                .map(|r| {
                    if *segment == ID_SEGMENT {
                        FieldValue::Int(r.id as i64)
                    } else {
                        r.attribute(segment).cloned().unwrap_or(FieldValue::Null)
                    }
                })
                .collect();
            let value = if collection {
                FieldValue::List(values.into_iter().filter(|v| *v != FieldValue::Null).collect())
            } else {
                values.into_iter().next().unwrap_or(FieldValue::Null)
            };
            return Ok(Resolved::Value(value));
        }

        return Err(ConfigError::UnknownPathSegment {
            type_name: declared,
            path: path.to_string(),
            segment: segment.to_string(),
        }
        .into());
    }

    Ok(Resolved::Records(current))
}
