//! Fetchers page through all records of one source type.

use std::collections::BTreeMap;
use std::sync::Arc;

use searchsync_types::{DocumentHandle, TypeRegistry};

use crate::backend::DocumentPayload;
use crate::error::SearchError;

/// Pages through all records of one source type and rebuilds documents from
/// serialized payloads.
pub trait Fetcher: Send + Sync {
    /// Type this fetcher pages through, subtypes included.
    fn source_type(&self) -> &str;

    fn total_count(&self) -> Result<usize, SearchError>;

    fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<DocumentHandle>, SearchError>;

    /// Rebuild a document from a payload, `None` when its record is gone.
    fn build_from_payload(&self, payload: &DocumentPayload) -> Result<Option<DocumentHandle>, SearchError>;
}

/// Fetchers keyed by source type.
///
/// Lookup walks the type ancestry, so a fetcher registered for a base type
/// also serves its subtypes.
#[derive(Clone)]
pub struct FetcherRegistry {
    registry: Arc<TypeRegistry>,
    fetchers: BTreeMap<String, Arc<dyn Fetcher>>,
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("types", &self.fetchers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FetcherRegistry {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            fetchers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(fetcher.source_type().to_string(), fetcher);
    }

    pub fn fetcher_for(&self, type_name: &str) -> Option<Arc<dyn Fetcher>> {
        let ancestry = self.registry.ancestry(type_name);
        if ancestry.is_empty() {
            return self.fetchers.get(type_name).cloned();
        }
        ancestry
            .iter()
            .find_map(|level| self.fetchers.get(level.as_str()))
            .cloned()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.fetchers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}
