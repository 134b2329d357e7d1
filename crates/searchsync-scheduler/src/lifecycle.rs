//! Keeps the indexes in step with publish, unpublish and delete events.

use chrono::{DateTime, Utc};
use tracing::info;

use searchsync_types::DocumentRef;

use crate::error::SchedulerError;
use crate::jobs::RemoveCascadeJob;
use crate::processor::{BatchProcessor, Dispatch};

/// Lifecycle hooks for versioned and plain records.
///
/// Publishing indexes the record into every active index with cascade.
/// Unpublishing or deleting removes it from every active index, then
/// re-evaluates whatever embedded its data as of one second before the
/// removal.
#[derive(Debug, Clone)]
pub struct PublishLifecycle {
    processor: BatchProcessor,
}

impl PublishLifecycle {
    pub fn new(processor: BatchProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    fn enabled(&self) -> bool {
        self.processor.env().config().enabled()
    }

    fn index_names(&self) -> Vec<String> {
        self.processor
            .env()
            .config()
            .index_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn on_after_publish(&self, type_name: &str, id: u64) -> Result<Vec<Dispatch>, SchedulerError> {
        if !self.enabled() {
            return Ok(Vec::new());
        }
        let reference = DocumentRef::new(type_name, id);
        info!(document = %reference, "Indexing published record");
        self.index_names()
            .iter()
            .map(|index| self.processor.add_documents(index, vec![reference.clone()]))
            .collect()
    }

    pub fn on_after_unpublish(&self, type_name: &str, id: u64) -> Result<Vec<Dispatch>, SchedulerError> {
        self.on_after_unpublish_at(type_name, id, Utc::now())
    }

    /// `at` is when the record left the live stage.
    pub fn on_after_unpublish_at(
        &self,
        type_name: &str,
        id: u64,
        at: DateTime<Utc>,
    ) -> Result<Vec<Dispatch>, SchedulerError> {
        self.removed(type_name, id, at)
    }

    pub fn on_after_delete(&self, type_name: &str, id: u64) -> Result<Vec<Dispatch>, SchedulerError> {
        self.on_after_delete_at(type_name, id, Utc::now())
    }

    pub fn on_after_delete_at(
        &self,
        type_name: &str,
        id: u64,
        at: DateTime<Utc>,
    ) -> Result<Vec<Dispatch>, SchedulerError> {
        self.removed(type_name, id, at)
    }

    fn removed(&self, type_name: &str, id: u64, at: DateTime<Utc>) -> Result<Vec<Dispatch>, SchedulerError> {
        if !self.enabled() {
            return Ok(Vec::new());
        }
        let reference = DocumentRef::new(type_name, id).with_archive_fallback();
        info!(document = %reference, at = %at, "Removing record from search");

        let mut dispatched = self
            .index_names()
            .iter()
            .map(|index| self.processor.remove_documents(index, vec![reference.clone()]))
            .collect::<Result<Vec<_>, _>>()?;

        let as_of = at - chrono::Duration::seconds(1);
        dispatched.push(self.processor.dispatch(RemoveCascadeJob::new(reference, as_of))?);
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use searchsync_search::MemoryBackend;
    use searchsync_types::Record;

    use crate::test_support::{settings, Fixture};

    fn lifecycle(fixture: &Fixture) -> PublishLifecycle {
        PublishLifecycle::new(BatchProcessor::new(fixture.env.clone()))
    }

    #[test]
    fn test_publish_then_unpublish() {
        let fixture = Fixture::new();
        let lifecycle = lifecycle(&fixture);
        fixture
            .store
            .write(Record::new("Article", 1).with_attribute("title", "Hello"))
            .unwrap();

        // drafts stay out of the index
        lifecycle.on_after_publish("Article", 1).unwrap();
        assert!(fixture.backend.ids("main").is_empty());

        fixture.store.publish("Article", 1).unwrap();
        lifecycle.on_after_publish("Article", 1).unwrap();
        assert_eq!(fixture.backend.ids("main"), vec!["page_1"]);

        let at = Utc::now();
        fixture.store.unpublish_at("Article", 1, at).unwrap();
        let dispatched = lifecycle.on_after_unpublish_at("Article", 1, at).unwrap();
        assert_eq!(dispatched.len(), 2);
        assert!(fixture.backend.ids("main").is_empty());
    }

    #[test]
    fn test_delete_cascades_to_dependents() {
        let fixture = Fixture::new();
        let lifecycle = lifecycle(&fixture);
        fixture.tag(1, "rust");
        fixture.publish(
            Record::new("Article", 1)
                .with_attribute("title", "Tagged")
                .with_link("tags", vec![1]),
        );
        lifecycle.on_after_publish("Tag", 1).unwrap();
        lifecycle.on_after_publish("Article", 1).unwrap();
        let before = fixture.backend.get_document("main", "page_1").unwrap().unwrap();
        assert_eq!(before.get("tags"), Some(&serde_json::json!(["rust"])));

        let at = Utc::now() + chrono::Duration::seconds(5);
        fixture.store.delete_at("Tag", 1, at).unwrap();
        lifecycle.on_after_delete_at("Tag", 1, at).unwrap();

        assert_eq!(fixture.backend.ids("main"), vec!["page_1"]);
        let after = fixture.backend.get_document("main", "page_1").unwrap().unwrap();
        assert_ne!(after.get("tags"), Some(&serde_json::json!(["rust"])));
    }

    #[test]
    fn test_disabled_search_ignores_events() {
        let mut search = settings();
        search.enabled = false;
        let fixture = Fixture::with_settings(search, MemoryBackend::new());
        fixture.articles(1);

        let lifecycle = lifecycle(&fixture);
        assert!(lifecycle.on_after_publish("Article", 1).unwrap().is_empty());
        assert!(lifecycle.on_after_delete("Article", 1).unwrap().is_empty());
        assert!(fixture.backend.ids("main").is_empty());
    }
}
