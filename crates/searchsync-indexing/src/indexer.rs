//! The chunked indexing engine.
//!
//! An [`Indexer`] splits a document list into chunks and processes one chunk
//! per call. For `Add`, each document is upserted or removed depending on
//! whether it still qualifies; for `Delete`, every document is removed.
//! Within a chunk upserts are flushed before removals. When cascading, the
//! dependents of each document in the chunk are drained through a nested
//! indexer before the next chunk starts.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use searchsync_config::IndexConfiguration;
use searchsync_search::{DocumentBuilder, FetcherRegistry, SearchBackend};
use searchsync_types::{ConfigError, Document, DocumentHandle, IndexEvent};

use crate::error::IndexingError;

/// What to do with the documents handed to an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOperation {
    /// Upsert documents that qualify, remove the ones that no longer do
    Add,
    /// Remove every document
    Delete,
}

/// Backend, configuration and payload builder shared by indexers.
#[derive(Clone)]
pub struct IndexingEnv {
    backend: Arc<dyn SearchBackend>,
    config: Arc<IndexConfiguration>,
    builder: DocumentBuilder,
}

impl std::fmt::Debug for IndexingEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingEnv")
            .field("config", &self.config)
            .finish()
    }
}

impl IndexingEnv {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        config: Arc<IndexConfiguration>,
        fetchers: Arc<FetcherRegistry>,
    ) -> Self {
        let builder = DocumentBuilder::new(Arc::clone(&backend), Arc::clone(&config), fetchers);
        Self {
            backend,
            config,
            builder,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn config(&self) -> &Arc<IndexConfiguration> {
        &self.config
    }

    pub fn builder(&self) -> &DocumentBuilder {
        &self.builder
    }
}

/// Counters for one or more processed chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub added: usize,
    pub removed: usize,
    /// Documents whose type is not indexed here
    pub skipped: usize,
    pub chunks: usize,
    /// Documents handed to nested cascade runs
    pub cascaded: usize,
}

impl IndexerStats {
    pub fn merge(&mut self, other: IndexerStats) {
        self.added += other.added;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.chunks += other.chunks;
        self.cascaded += other.cascaded;
    }
}

/// Processes a document list against one index, chunk by chunk.
pub struct Indexer {
    env: IndexingEnv,
    index: String,
    operation: IndexOperation,
    batch_size: usize,
    process_dependencies: bool,
    depth: usize,
    chunks: VecDeque<Vec<DocumentHandle>>,
    chunk_count: usize,
    document_count: usize,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("index", &self.index)
            .field("operation", &self.operation)
            .field("batch_size", &self.batch_size)
            .field("depth", &self.depth)
            .field("remaining_chunks", &self.chunks.len())
            .finish()
    }
}

impl Indexer {
    /// Create an indexer over `documents`, in their given order.
    pub fn new(
        env: IndexingEnv,
        index: impl Into<String>,
        documents: Vec<DocumentHandle>,
        operation: IndexOperation,
        batch_size: usize,
        process_dependencies: bool,
    ) -> Result<Self, IndexingError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(0).into());
        }

        let document_count = documents.len();
        let mut chunks = VecDeque::new();
        let mut documents = documents.into_iter().peekable();
        while documents.peek().is_some() {
            chunks.push_back(documents.by_ref().take(batch_size).collect::<Vec<_>>());
        }

        Ok(Self {
            env,
            index: index.into(),
            operation,
            batch_size,
            process_dependencies,
            depth: 0,
            chunk_count: chunks.len(),
            document_count,
            chunks,
        })
    }

    fn nested(&self, documents: Vec<DocumentHandle>) -> Result<Self, IndexingError> {
        let mut indexer = Self::new(
            self.env.clone(),
            self.index.clone(),
            documents,
            IndexOperation::Add,
            self.batch_size,
            true,
        )?;
        indexer.depth = self.depth + 1;
        Ok(indexer)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn operation(&self) -> IndexOperation {
        self.operation
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Total chunks the document list was split into.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn remaining_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Process the next chunk. A no-op once complete.
    pub fn process_chunk(&mut self) -> Result<IndexerStats, IndexingError> {
        let Some(chunk) = self.chunks.pop_front() else {
            return Ok(IndexerStats::default());
        };

        let mut stats = IndexerStats {
            chunks: 1,
            ..IndexerStats::default()
        };

        let (to_add, to_remove) = match self.operation {
            IndexOperation::Add => self.partition(&chunk, &mut stats)?,
            IndexOperation::Delete => (Vec::new(), chunk.clone()),
        };

        stats.added = self.add(&to_add)?;
        stats.removed = self.remove(&to_remove)?;

        debug!(
            index = %self.index,
            depth = self.depth,
            added = stats.added,
            removed = stats.removed,
            skipped = stats.skipped,
            remaining = self.chunks.len(),
            "Processed chunk"
        );

        if self.process_dependencies {
            self.cascade(&chunk, &mut stats)?;
        }

        Ok(stats)
    }

    /// Drain every remaining chunk.
    pub fn run(&mut self) -> Result<IndexerStats, IndexingError> {
        let mut stats = IndexerStats::default();
        while !self.is_complete() {
            stats.merge(self.process_chunk()?);
        }
        if self.depth == 0 {
            info!(
                index = %self.index,
                operation = ?self.operation,
                added = stats.added,
                removed = stats.removed,
                cascaded = stats.cascaded,
                "Indexing pass complete"
            );
        }
        Ok(stats)
    }

    /// Split an `Add` chunk into upserts and removals.
    #[allow(clippy::type_complexity)]
    fn partition(
        &self,
        chunk: &[DocumentHandle],
        stats: &mut IndexerStats,
    ) -> Result<(Vec<DocumentHandle>, Vec<DocumentHandle>), IndexingError> {
        let config = self.env.config();
        let mut to_add = Vec::new();
        let mut to_remove = Vec::new();

        for document in chunk {
            let source_type = document.source_type();
            if !config.indexes_for_type(source_type).contains_key(self.index.as_str()) {
                stats.skipped += 1;
                continue;
            }

            // Membership filters run once, here
            let qualifies = document.is_eligible()?
                && config
                    .indexes_for_document(document.as_ref())?
                    .iter()
                    .any(|name| *name == self.index);

            if qualifies {
                to_add.push(Arc::clone(document));
            } else {
                to_remove.push(Arc::clone(document));
            }
        }

        Ok((to_add, to_remove))
    }

    fn fire(&self, documents: &[DocumentHandle], event: IndexEvent) -> Result<(), IndexingError> {
        for document in documents {
            if let Some(hooks) = document.hooks() {
                hooks.on_index_event(event, &self.index)?;
            }
        }
        Ok(())
    }

    fn add(&self, documents: &[DocumentHandle]) -> Result<usize, IndexingError> {
        if documents.is_empty() {
            return Ok(0);
        }
        self.fire(documents, IndexEvent::BeforeAdd)?;

        let payloads = documents
            .iter()
            .map(|document| self.env.builder().to_payload(document.as_ref(), &self.index))
            .collect::<Result<Vec<_>, _>>()?;
        let backend_index = self.env.config().backend_index_name(&self.index);
        let accepted = self.env.backend().add_documents(&backend_index, payloads)?;

        self.fire(documents, IndexEvent::AfterAdd)?;
        Ok(accepted.len())
    }

    fn remove(&self, documents: &[DocumentHandle]) -> Result<usize, IndexingError> {
        if documents.is_empty() {
            return Ok(0);
        }
        self.fire(documents, IndexEvent::BeforeRemove)?;

        let payloads = documents
            .iter()
            .map(|document| self.env.builder().to_removal_payload(document.as_ref()))
            .collect();
        let backend_index = self.env.config().backend_index_name(&self.index);
        self.env.backend().remove_documents(&backend_index, payloads)?;

        self.fire(documents, IndexEvent::AfterRemove)?;
        Ok(documents.len())
    }

    fn cascade(&self, chunk: &[DocumentHandle], stats: &mut IndexerStats) -> Result<(), IndexingError> {
        let max_depth = self.env.config().max_cascade_depth();

        for document in chunk {
            let Some(tracking) = document.dependency_tracking() else {
                continue;
            };
            let identifier = document.identifier();
            let dependents: Vec<DocumentHandle> = tracking
                .dependent_documents()?
                .into_iter()
                .filter(|dependent| dependent.identifier() != identifier)
                .collect();
            if dependents.is_empty() {
                continue;
            }

            if self.depth >= max_depth {
                warn!(
                    index = %self.index,
                    document = %identifier,
                    depth = self.depth,
                    dependents = dependents.len(),
                    "Cascade depth limit reached, not descending"
                );
                continue;
            }

            debug!(
                index = %self.index,
                document = %identifier,
                dependents = dependents.len(),
                "Cascading to dependents"
            );
            stats.cascaded += dependents.len();
            let mut nested = self.nested(dependents)?;
            stats.merge(nested.run()?);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use searchsync_config::FnFilter;
    use searchsync_search::MemoryBackend;
    use searchsync_types::{
        DocumentError, Field, FieldValue, IncludeSettings, IndexSettings,
        MemoryRecordStore, Record, RecordId, RecordStore, SearchSettings, TypeDef, TypeRegistry,
    };

    use crate::context::RecordContext;

    struct Fixture {
        store: Arc<MemoryRecordStore>,
        backend: Arc<MemoryBackend>,
        ctx: Arc<RecordContext>,
        env: IndexingEnv,
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::new(vec![
            TypeDef::new("Page").attribute("title").versioned(),
            TypeDef::new("Article").extends("Page").many_many("tags", "Tag"),
            TypeDef::new("Tag").attribute("name"),
            TypeDef::new("Note").attribute("body"),
        ])
        .unwrap()
    }

    fn fixture_with(settings: SearchSettings) -> Fixture {
        let registry = registry();
        let store = Arc::new(MemoryRecordStore::new(registry.clone()));
        let registry = Arc::new(registry);
        let config = Arc::new(IndexConfiguration::new(settings, Arc::clone(&registry)).unwrap());
        let backend = Arc::new(MemoryBackend::new());
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let ctx = Arc::new(RecordContext::new(store_dyn, Arc::clone(&config)));
        let backend_dyn: Arc<dyn SearchBackend> = backend.clone();
        let env = IndexingEnv::new(backend_dyn, config, Arc::new(FetcherRegistry::new(registry)));
        Fixture {
            store,
            backend,
            ctx,
            env,
        }
    }

    fn settings() -> SearchSettings {
        SearchSettings::default()
            .with_index(
                "main",
                IndexSettings::new()
                    .include(
                        IncludeSettings::new("Article")
                            .field("title")
                            .field_with_property("tags", "tags.name"),
                    )
                    .include(IncludeSettings::new("Tag").field("name")),
            )
            .with_index(
                "tags",
                IndexSettings::new().include(IncludeSettings::new("Tag").field("name")),
            )
    }

    fn fixture() -> Fixture {
        fixture_with(settings())
    }

    impl Fixture {
        fn publish(&self, record: Record) {
            let (type_name, id) = (record.type_name.clone(), record.id);
            self.store.write(record).unwrap();
            self.store.publish(&type_name, id).unwrap();
        }

        fn doc(&self, type_name: &str, id: RecordId) -> DocumentHandle {
            Arc::new(self.ctx.document(type_name, id).unwrap().unwrap())
        }

        fn indexer(&self, docs: Vec<DocumentHandle>, op: IndexOperation, batch: usize, cascade: bool) -> Indexer {
            Indexer::new(self.env.clone(), "main", docs, op, batch, cascade).unwrap()
        }
    }

    #[test]
    fn test_chunks_preserve_order_and_size() {
        let f = fixture();
        for id in 1..=5 {
            f.store.write(Record::new("Tag", id)).unwrap();
        }
        let docs: Vec<_> = (1..=5).map(|id| f.doc("Tag", id)).collect();
        let mut indexer = f.indexer(docs, IndexOperation::Add, 2, false);

        assert_eq!(indexer.chunk_count(), 3);
        assert_eq!(indexer.document_count(), 5);
        assert!(!indexer.is_complete());

        let first = indexer.process_chunk().unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(f.backend.ids("main"), vec!["tag_1", "tag_2"]);

        let rest = indexer.run().unwrap();
        assert_eq!(rest.added, 3);
        assert_eq!(rest.chunks, 2);
        assert!(indexer.is_complete());
        assert_eq!(indexer.process_chunk().unwrap(), IndexerStats::default());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let f = fixture();
        let result = Indexer::new(f.env.clone(), "main", Vec::new(), IndexOperation::Add, 0, false);
        assert!(matches!(
            result,
            Err(IndexingError::Config(ConfigError::InvalidBatchSize(0)))
        ));
    }

    #[test]
    fn test_empty_list_is_complete() {
        let f = fixture();
        let indexer = f.indexer(Vec::new(), IndexOperation::Add, 10, true);
        assert_eq!(indexer.chunk_count(), 0);
        assert!(indexer.is_complete());
    }

    #[test]
    fn test_add_removes_documents_that_no_longer_qualify() {
        let f = fixture();
        f.publish(Record::new("Article", 1).with_attribute("title", "Live"));
        f.store.write(Record::new("Article", 2).with_attribute("title", "Draft")).unwrap();

        let docs = vec![f.doc("Article", 1), f.doc("Article", 2)];
        let stats = f.indexer(docs, IndexOperation::Add, 10, false).run().unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(f.backend.ids("main"), vec!["page_1"]);
        assert_eq!(f.backend.calls().add.load(Ordering::Relaxed), 1);
        assert_eq!(f.backend.calls().remove.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_add_skips_types_outside_the_index() {
        let f = fixture();
        f.store.write(Record::new("Note", 1)).unwrap();
        f.publish(Record::new("Article", 2));
        let docs = vec![f.doc("Note", 1), f.doc("Article", 2)];

        let stats = Indexer::new(f.env.clone(), "tags", docs, IndexOperation::Add, 10, false)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.added + stats.removed, 0);
        assert_eq!(f.backend.calls().add.load(Ordering::Relaxed), 0);
        assert_eq!(f.backend.calls().remove.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_delete_removes_without_deciding() {
        let f = fixture();
        f.publish(Record::new("Article", 1));
        f.indexer(vec![f.doc("Article", 1)], IndexOperation::Add, 10, false)
            .run()
            .unwrap();
        assert_eq!(f.backend.ids("main"), vec!["page_1"]);

        let stats = f
            .indexer(vec![f.doc("Article", 1)], IndexOperation::Delete, 10, false)
            .run()
            .unwrap();
        assert_eq!(stats.removed, 1);
        assert!(f.backend.ids("main").is_empty());
    }

    #[test]
    fn test_variant_prefixes_backend_index() {
        let mut settings = settings();
        settings.index_variant = Some("staging".into());
        let f = fixture_with(settings);
        f.store.write(Record::new("Tag", 1)).unwrap();

        f.indexer(vec![f.doc("Tag", 1)], IndexOperation::Add, 10, false)
            .run()
            .unwrap();
        assert_eq!(f.backend.ids("staging-main"), vec!["tag_1"]);
        assert!(f.backend.ids("main").is_empty());
    }

    #[test]
    fn test_after_add_hook_marks_records() {
        let f = fixture();
        f.store.write(Record::new("Tag", 1)).unwrap();
        f.indexer(vec![f.doc("Tag", 1)], IndexOperation::Add, 10, false)
            .run()
            .unwrap();
        assert!(f.store.indexed_at("Tag", 1).is_some());
    }

    #[test]
    fn test_cascade_reindexes_dependents() {
        let f = fixture();
        f.store.write(Record::new("Tag", 1).with_attribute("name", "rust")).unwrap();
        for id in 1..=3 {
            f.publish(Record::new("Article", id).with_link("tags", vec![1]));
        }
        f.publish(Record::new("Article", 4));

        let stats = f
            .indexer(vec![f.doc("Tag", 1)], IndexOperation::Add, 2, true)
            .run()
            .unwrap();

        assert_eq!(stats.cascaded, 3);
        assert_eq!(stats.added, 4);
        assert_eq!(stats.chunks, 3);
        assert_eq!(f.backend.ids("main"), vec!["page_1", "page_2", "page_3", "tag_1"]);
    }

    #[test]
    fn test_membership_filters_run_once_per_document() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Arc::new(registry());
        let store = Arc::new(MemoryRecordStore::new(registry.as_ref().clone()));
        let config = IndexConfiguration::new(settings(), Arc::clone(&registry))
            .unwrap()
            .with_filter(Arc::new(FnFilter(
                move |_: &dyn Document, names: Vec<String>| -> Result<Vec<String>, DocumentError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(names)
                },
            )));
        let config = Arc::new(config);
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let ctx = Arc::new(RecordContext::new(store_dyn, Arc::clone(&config)));
        let backend: Arc<dyn SearchBackend> = Arc::new(MemoryBackend::new());
        let env = IndexingEnv::new(backend, config, Arc::new(FetcherRegistry::new(registry)));

        for id in 1..=3 {
            store.write(Record::new("Tag", id)).unwrap();
        }
        let docs: Vec<DocumentHandle> = (1..=3)
            .map(|id| Arc::new(ctx.document("Tag", id).unwrap().unwrap()) as DocumentHandle)
            .collect();
        let stats = Indexer::new(env, "main", docs, IndexOperation::Add, 10, false)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.added, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_no_cascade_without_flag() {
        let f = fixture();
        f.store.write(Record::new("Tag", 1)).unwrap();
        f.publish(Record::new("Article", 1).with_link("tags", vec![1]));

        let stats = f
            .indexer(vec![f.doc("Tag", 1)], IndexOperation::Add, 10, false)
            .run()
            .unwrap();
        assert_eq!(stats.cascaded, 0);
        assert_eq!(f.backend.ids("main"), vec!["tag_1"]);
    }

    #[test]
    fn test_cascade_depth_guard() {
        let mut settings = settings();
        settings.max_cascade_depth = 0;
        let f = fixture_with(settings);
        f.store.write(Record::new("Tag", 1)).unwrap();
        f.publish(Record::new("Article", 1).with_link("tags", vec![1]));

        let stats = f
            .indexer(vec![f.doc("Tag", 1)], IndexOperation::Add, 10, true)
            .run()
            .unwrap();
        assert_eq!(stats.cascaded, 0);
        assert_eq!(f.backend.ids("main"), vec!["tag_1"]);
    }

    #[derive(Debug)]
    struct Looping {
        id: RecordId,
        peer: RecordId,
    }

    impl Document for Looping {
        fn source_type(&self) -> &str {
            "Tag"
        }

        fn base_type(&self) -> &str {
            "Tag"
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

        fn dependency_tracking(&self) -> Option<&dyn searchsync_types::DependencyTracking> {
            Some(self)
        }
    }

    impl searchsync_types::DependencyTracking for Looping {
        fn dependent_documents_in(&self, _view: searchsync_types::View) -> Result<Vec<DocumentHandle>, DocumentError> {
            Ok(vec![Arc::new(Looping {
                id: self.peer,
                peer: self.id,
            })])
        }
    }

    #[test]
    fn test_cyclic_dependents_terminate() {
        let f = fixture();
        let doc: DocumentHandle = Arc::new(Looping {
            id: 1,
            peer: 2,
        });

        let mut indexer = f.indexer(vec![doc], IndexOperation::Add, 10, true);
        let stats = indexer.run().unwrap();
        assert!(indexer.is_complete());
        assert_eq!(stats.cascaded, 8);
        assert_eq!(f.backend.ids("main"), vec!["tag_1", "tag_2"]);
    }

    #[test]
    fn test_backend_failure_propagates_status() {
        let f = fixture();
        f.store.write(Record::new("Tag", 1)).unwrap();
        f.backend.fail_next(504);

        let err = f
            .indexer(vec![f.doc("Tag", 1)], IndexOperation::Add, 10, false)
            .run()
            .unwrap_err();
        assert_eq!(err.status_code(), Some(504));
    }
}
