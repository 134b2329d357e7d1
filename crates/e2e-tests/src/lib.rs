//! End-to-end test infrastructure for searchsync.
//!
//! Provides a shared TestHarness wiring an in-memory record store and search
//! backend to the indexing engine, the job queue and the publish lifecycle.

use std::sync::Arc;

use searchsync_config::IndexConfiguration;
use searchsync_indexing::{RecordContext, RecordDocument};
use searchsync_scheduler::{
    BatchProcessor, JobEnvironment, JobQueue, PublishLifecycle, RetryPolicy,
};
use searchsync_search::{MemoryBackend, SearchBackend};
use searchsync_storage::Storage;
use searchsync_types::{
    ClearIndexSettings, IncludeSettings, IndexSettings, MemoryRecordStore, Record, RecordId,
    RecordStore, RetrySettings, SearchSettings, TypeDef, TypeRegistry,
};

/// Content model used by every scenario: versioned pages and articles,
/// plain tags and authors.
pub fn content_registry() -> TypeRegistry {
    TypeRegistry::new(vec![
        TypeDef::new("Page")
            .attribute("title")
            .attribute("content")
            .attribute("show_in_search")
            .versioned(),
        TypeDef::new("Article")
            .extends("Page")
            .attribute("summary")
            .many_many("tags", "Tag")
            .has_one("author", "Author"),
        TypeDef::new("Tag").attribute("name"),
        TypeDef::new("Author").attribute("name"),
    ])
    .expect("content registry is valid")
}

/// One index `main` with Article `{title, tags.name}`.
pub fn article_settings() -> SearchSettings {
    SearchSettings::default().with_index(
        "main",
        IndexSettings::new().include(
            IncludeSettings::new("Article")
                .field("title")
                .field_with_property("tags", "tags.name"),
        ),
    )
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Job queue storage
    pub storage: Arc<Storage>,
    pub store: Arc<MemoryRecordStore>,
    pub backend: Arc<MemoryBackend>,
    pub config: Arc<IndexConfiguration>,
    pub records: Arc<RecordContext>,
    pub env: JobEnvironment,
    pub queue: Arc<JobQueue>,
}

impl TestHarness {
    pub fn new(settings: SearchSettings) -> Self {
        Self::with_backend(settings, MemoryBackend::new(), RetrySettings::default())
    }

    pub fn with_backend(settings: SearchSettings, backend: MemoryBackend, retry: RetrySettings) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));

        let registry = content_registry();
        let store = Arc::new(MemoryRecordStore::new(registry.clone()));
        let config = Arc::new(
            IndexConfiguration::new(settings, Arc::new(registry)).expect("Failed to build index configuration"),
        );
        let backend = Arc::new(backend);

        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let backend_dyn: Arc<dyn SearchBackend> = backend.clone();
        let records = Arc::new(RecordContext::new(store_dyn, Arc::clone(&config)));
        let env = JobEnvironment::with_context(
            Arc::clone(&records),
            backend_dyn,
            ClearIndexSettings {
                poll_attempts: 3,
                poll_delay_ms: 10,
            },
        );
        let queue = Arc::new(JobQueue::new(
            Arc::clone(&storage),
            env.clone(),
            RetryPolicy::new(retry),
        ));

        Self {
            _temp_dir: temp_dir,
            storage,
            store,
            backend,
            config,
            records,
            env,
            queue,
        }
    }

    /// Processor that runs jobs inline.
    pub fn processor(&self) -> BatchProcessor {
        BatchProcessor::new(self.env.clone())
    }

    /// Processor that queues jobs.
    pub fn queued_processor(&self) -> BatchProcessor {
        BatchProcessor::with_queue(Arc::clone(&self.queue))
    }

    pub fn lifecycle(&self) -> PublishLifecycle {
        PublishLifecycle::new(self.processor())
    }

    pub fn write(&self, record: Record) {
        self.store.write(record).expect("Failed to write record");
    }

    pub fn publish(&self, record: Record) {
        let (type_name, id) = (record.type_name.clone(), record.id);
        self.write(record);
        self.store.publish(&type_name, id).expect("Failed to publish record");
    }

    pub fn document(&self, type_name: &str, id: RecordId) -> RecordDocument {
        self.records
            .document(type_name, id)
            .expect("Failed to read record")
            .expect("Record does not exist")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(article_settings())
    }
}

/// Tags `1..=count` named `tag-{n}`.
pub fn create_tags(harness: &TestHarness, count: u64) {
    for id in 1..=count {
        harness.write(Record::new("Tag", id).with_attribute("name", format!("tag-{id}")));
    }
}

/// A published article linked to `tags`.
pub fn create_article(harness: &TestHarness, id: RecordId, title: &str, tags: Vec<RecordId>) {
    harness.publish(
        Record::new("Article", id)
            .with_attribute("title", title)
            .with_link("tags", tags),
    );
}
