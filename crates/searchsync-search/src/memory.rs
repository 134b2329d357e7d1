//! In-process search backend.
//!
//! Holds documents per index in id order. Supports fault injection and
//! simulated asynchronous deletion so retry and polling paths can be
//! exercised without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::backend::{payload_id, DocumentPayload, SearchBackend};
use crate::error::SearchError;

#[derive(Debug, Default)]
struct Lag {
    /// Cleared documents still reported by `document_count`
    ghosts: usize,
    reads_left: u32,
}

/// Call counters, for assertions in tests.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub add: AtomicUsize,
    pub remove: AtomicUsize,
    pub count: AtomicUsize,
    pub clear: AtomicUsize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    indexes: RwLock<BTreeMap<String, BTreeMap<String, DocumentPayload>>>,
    max_document_size: Option<usize>,
    failures: Mutex<VecDeque<u16>>,
    clear_lag: u32,
    lag: Mutex<BTreeMap<String, Lag>>,
    calls: CallCounts,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_document_size(mut self, bytes: usize) -> Self {
        self.max_document_size = Some(bytes);
        self
    }

    /// Cleared documents keep being counted for `reads` count calls.
    pub fn with_clear_lag(mut self, reads: u32) -> Self {
        self.clear_lag = reads;
        self
    }

    /// Make the next backend call fail with `status`.
    pub fn fail_next(&self, status: u16) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(status);
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Ids held in `index`, in order.
    pub fn ids(&self, index: &str) -> Vec<String> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed `count` placeholder documents into `index`.
    pub fn seed(&self, index: &str, count: usize) {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let docs = indexes.entry(index.to_string()).or_default();
        for n in 0..count {
            let id = format!("seed_{:06}", n);
            let mut payload = DocumentPayload::new();
            payload.insert("id".to_string(), id.clone().into());
            docs.insert(id, payload);
        }
    }

    fn check_failure(&self, operation: &str) -> Result<(), SearchError> {
        let next = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(status) => Err(SearchError::backend(
                status,
                format!("injected failure during {}", operation),
            )),
            None => Ok(()),
        }
    }

    fn ids_of(documents: &[DocumentPayload]) -> Result<Vec<String>, SearchError> {
        documents
            .iter()
            .map(|d| {
                payload_id(d).ok_or_else(|| SearchError::backend(Some(400), "document has no id"))
            })
            .collect()
    }
}

impl SearchBackend for MemoryBackend {
    fn add_documents(&self, index: &str, documents: Vec<DocumentPayload>) -> Result<Vec<String>, SearchError> {
        self.calls.add.fetch_add(1, Ordering::Relaxed);
        self.check_failure("add")?;

        let ids = Self::ids_of(&documents)?;
        if let Some(max) = self.max_document_size {
            for (id, document) in ids.iter().zip(&documents) {
                let size = serde_json::to_vec(document)?.len();
                if size > max {
                    return Err(SearchError::backend(
                        Some(413),
                        format!("document {} is {} bytes, limit is {}", id, size, max),
                    ));
                }
            }
        }

        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let docs = indexes.entry(index.to_string()).or_default();
        for (id, document) in ids.iter().zip(documents) {
            docs.insert(id.clone(), document);
        }
        debug!(index, count = ids.len(), "Stored documents");
        Ok(ids)
    }

    fn remove_documents(&self, index: &str, documents: Vec<DocumentPayload>) -> Result<Vec<String>, SearchError> {
        self.calls.remove.fetch_add(1, Ordering::Relaxed);
        self.check_failure("remove")?;

        let ids = Self::ids_of(&documents)?;
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(docs) = indexes.get_mut(index) else {
            return Ok(Vec::new());
        };
        Ok(ids.into_iter().filter(|id| docs.remove(id).is_some()).collect())
    }

    fn document_count(&self, index: &str) -> Result<usize, SearchError> {
        self.calls.count.fetch_add(1, Ordering::Relaxed);
        self.check_failure("count")?;

        let stored = self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map_or(0, BTreeMap::len);

        let mut lag = self.lag.lock().unwrap_or_else(PoisonError::into_inner);
        let ghosts = match lag.get_mut(index) {
            Some(state) if state.reads_left > 0 => {
                state.reads_left -= 1;
                let ghosts = state.ghosts;
                if state.reads_left == 0 {
                    state.ghosts = 0;
                }
                ghosts
            }
            _ => 0,
        };
        Ok(stored + ghosts)
    }

    fn clear_documents(&self, index: &str, max_count: usize) -> Result<usize, SearchError> {
        self.calls.clear.fetch_add(1, Ordering::Relaxed);
        self.check_failure("clear")?;

        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(docs) = indexes.get_mut(index) else {
            return Ok(0);
        };
        let doomed: Vec<String> = docs.keys().take(max_count).cloned().collect();
        for id in &doomed {
            docs.remove(id);
        }

        if self.clear_lag > 0 && !doomed.is_empty() {
            let mut lag = self.lag.lock().unwrap_or_else(PoisonError::into_inner);
            let state = lag.entry(index.to_string()).or_default();
            state.ghosts += doomed.len();
            state.reads_left = self.clear_lag;
        }
        Ok(doomed.len())
    }

    fn max_document_size(&self) -> Option<usize> {
        self.max_document_size
    }

    fn get_document(&self, index: &str, id: &str) -> Result<Option<DocumentPayload>, SearchError> {
        Ok(self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn list_documents(&self, index: &str, limit: usize, offset: usize) -> Result<Vec<DocumentPayload>, SearchError> {
        Ok(self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|docs| docs.values().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
