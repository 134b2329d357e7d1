//! Records as held by the record store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Record identifier, unique within a base type.
pub type RecordId = u64;

/// A snapshot of one record: its concrete type, attribute values and the
/// ids it links to through each relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    pub id: RecordId,
    #[serde(default)]
    pub attributes: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub links: BTreeMap<String, Vec<RecordId>>,
}

impl Record {
    pub fn new(type_name: impl Into<String>, id: RecordId) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            attributes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_link(mut self, relation: impl Into<String>, ids: Vec<RecordId>) -> Self {
        self.links.insert(relation.into(), ids);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }

    /// Ids linked through `relation`, empty when none are set.
    pub fn linked_ids(&self, relation: &str) -> &[RecordId] {
        self.links.get(relation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// An explicit `false` in a boolean attribute; absent means allowed.
    pub fn flag_denies(&self, name: &str) -> bool {
        matches!(self.attribute(name).and_then(FieldValue::as_bool), Some(false))
    }
}
