//! In-process record store with draft/live stages and publish history.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::record::{Record, RecordId};
use crate::registry::TypeRegistry;
use crate::store::{RecordStore, View};

#[derive(Debug, Default)]
struct Entry {
    draft: Option<Record>,
    live: Option<Record>,
    /// Live state changes in time order; `None` marks removal.
    history: Vec<(DateTime<Utc>, Option<Record>)>,
    last_written: Option<Record>,
    indexed_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn visible(&self, view: View) -> Option<&Record> {
        match view {
            View::Draft => self.draft.as_ref(),
            View::Live => self.live.as_ref(),
            View::Archived(at) => self
                .history
                .iter()
                .rev()
                .find(|(ts, _)| *ts <= at)
                .and_then(|(_, record)| record.as_ref()),
        }
    }

    fn latest(&self) -> Option<&Record> {
        self.draft.as_ref().or(self.last_written.as_ref())
    }
}

/// Record store kept in memory.
///
/// Versioned types are written to the draft stage and become visible in the
/// live view only once published. Other types go live as soon as they are
/// written. Every change to the live stage is recorded with its timestamp so
/// that [`View::Archived`] can reproduce the graph as it was.
#[derive(Debug)]
pub struct MemoryRecordStore {
    registry: TypeRegistry,
    entries: RwLock<BTreeMap<(String, RecordId), Entry>>,
}

impl MemoryRecordStore {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn key(&self, type_name: &str, id: RecordId) -> Result<(String, RecordId), StoreError> {
        if !self.registry.contains(type_name) {
            return Err(StoreError::UnknownType(type_name.to_string()));
        }
        Ok((self.registry.base_type(type_name).to_string(), id))
    }

    fn not_found(type_name: &str, id: RecordId) -> StoreError {
        StoreError::NotFound {
            type_name: type_name.to_string(),
            id,
        }
    }

    /// Write a record, now.
    pub fn write(&self, record: Record) -> Result<(), StoreError> {
        self.write_at(record, Utc::now())
    }

    pub fn write_at(&self, record: Record, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(&record.type_name, record.id)?;
        let versioned = self.registry.is_versioned(&record.type_name);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(key).or_default();
        if !versioned {
            entry.live = Some(record.clone());
            entry.history.push((at, Some(record.clone())));
        }
        entry.last_written = Some(record.clone());
        entry.draft = Some(record);
        Ok(())
    }

    /// Copy the draft stage to live.
    pub fn publish(&self, type_name: &str, id: RecordId) -> Result<(), StoreError> {
        self.publish_at(type_name, id, Utc::now())
    }

    pub fn publish_at(&self, type_name: &str, id: RecordId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(type_name, id)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(type_name, id))?;
        let draft = entry
            .draft
            .clone()
            .ok_or_else(|| Self::not_found(type_name, id))?;
        entry.live = Some(draft.clone());
        entry.history.push((at, Some(draft)));
        Ok(())
    }

    /// Remove the live stage, keeping the draft.
    pub fn unpublish(&self, type_name: &str, id: RecordId) -> Result<(), StoreError> {
        self.unpublish_at(type_name, id, Utc::now())
    }

    pub fn unpublish_at(&self, type_name: &str, id: RecordId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(type_name, id)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(type_name, id))?;
        entry.live = None;
        entry.history.push((at, None));
        Ok(())
    }

    /// Remove both stages. History and the latest snapshot survive.
    pub fn delete(&self, type_name: &str, id: RecordId) -> Result<(), StoreError> {
        self.delete_at(type_name, id, Utc::now())
    }

    pub fn delete_at(&self, type_name: &str, id: RecordId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(type_name, id)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(type_name, id))?;
        entry.draft = None;
        if entry.live.take().is_some() {
            entry.history.push((at, None));
        }
        Ok(())
    }

    /// When the record was last sent to an index.
    pub fn indexed_at(&self, type_name: &str, id: RecordId) -> Option<DateTime<Utc>> {
        let key = self.key(type_name, id).ok()?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).and_then(|e| e.indexed_at)
    }

    fn visible_of_type(&self, view: View, type_name: &str) -> Result<Vec<Record>, StoreError> {
        let base = self.key(type_name, 0)?.0;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .range((base.clone(), RecordId::MIN)..=(base, RecordId::MAX))
            .filter_map(|(_, entry)| entry.visible(view))
            .filter(|r| self.registry.is_subtype_of(&r.type_name, type_name))
            .cloned()
            .collect())
    }
}

impl RecordStore for MemoryRecordStore {
    fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn get(&self, view: View, type_name: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        let key = self.key(type_name, id)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(&key)
            .and_then(|e| e.visible(view))
            .filter(|r| self.registry.is_subtype_of(&r.type_name, type_name))
            .cloned())
    }

    fn query(
        &self,
        view: View,
        type_name: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .visible_of_type(view, type_name)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn count(&self, view: View, type_name: &str) -> Result<usize, StoreError> {
        Ok(self.visible_of_type(view, type_name)?.len())
    }

    fn latest_version(&self, type_name: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        let key = self.key(type_name, id)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key).and_then(Entry::latest).cloned())
    }

    fn mark_indexed(&self, type_name: &str, id: RecordId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(type_name, id)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&key) {
            entry.indexed_at = Some(at);
        }
        Ok(())
    }
}
