//! Shared fixture for scheduler unit tests.

use std::sync::Arc;

use searchsync_config::IndexConfiguration;
use searchsync_search::{MemoryBackend, SearchBackend};
use searchsync_types::{
    ClearIndexSettings, DocumentRef, IncludeSettings, IndexSettings, MemoryRecordStore, Record,
    RecordId, RecordStore, SearchSettings, TypeDef, TypeRegistry,
};

use crate::env::JobEnvironment;

pub(crate) struct Fixture {
    pub store: Arc<MemoryRecordStore>,
    pub backend: Arc<MemoryBackend>,
    pub env: JobEnvironment,
}

fn registry() -> TypeRegistry {
    TypeRegistry::new(vec![
        TypeDef::new("Page").attribute("title").versioned(),
        TypeDef::new("Article").extends("Page").many_many("tags", "Tag"),
        TypeDef::new("Tag").attribute("name"),
    ])
    .unwrap()
}

pub(crate) fn settings() -> SearchSettings {
    SearchSettings::default().with_index(
        "main",
        IndexSettings::new()
            .include(
                IncludeSettings::new("Article")
                    .batch_size(2)
                    .field("title")
                    .field_with_property("tags", "tags.name"),
            )
            .include(IncludeSettings::new("Tag").field("name")),
    )
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(settings(), MemoryBackend::new())
    }

    pub fn with_settings(settings: SearchSettings, backend: MemoryBackend) -> Self {
        let registry = registry();
        let store = Arc::new(MemoryRecordStore::new(registry.clone()));
        let config = Arc::new(IndexConfiguration::new(settings, Arc::new(registry)).unwrap());
        let backend = Arc::new(backend);
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let backend_dyn: Arc<dyn SearchBackend> = backend.clone();
        let env = JobEnvironment::new(
            store_dyn,
            backend_dyn,
            config,
            ClearIndexSettings {
                poll_attempts: 3,
                poll_delay_ms: 1,
            },
        );
        Self { store, backend, env }
    }

    pub fn publish(&self, record: Record) {
        let (type_name, id) = (record.type_name.clone(), record.id);
        self.store.write(record).unwrap();
        self.store.publish(&type_name, id).unwrap();
    }

    pub fn tag(&self, id: RecordId, name: &str) {
        self.store
            .write(Record::new("Tag", id).with_attribute("name", name))
            .unwrap();
    }

    /// Publish articles `1..=count`.
    pub fn articles(&self, count: u64) {
        for id in 1..=count {
            self.publish(Record::new("Article", id).with_attribute("title", format!("Article {id}")));
        }
    }

    pub fn article_refs(&self, count: u64) -> Vec<DocumentRef> {
        (1..=count).map(|id| DocumentRef::new("Article", id)).collect()
    }
}
