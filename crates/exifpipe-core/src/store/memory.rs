//! In-memory document store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{project, Document, DocumentStore, UpsertOutcome};
use crate::error::StoreError;

/// Keeps documents in a map; used for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Document> {
        self.docs.lock().ok().and_then(|d| d.get(key).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Document>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Persist {
                key: String::new(),
                message: "memory store lock poisoned".to_string(),
            })
    }
}

impl DocumentStore for MemoryStore {
    fn replace_upsert(&self, key: &str, doc: &Document) -> Result<UpsertOutcome, StoreError> {
        let previous = self.lock()?.insert(key.to_string(), doc.clone());
        Ok(match previous {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        })
    }

    fn find(&self, fields: &[String]) -> Result<Vec<Document>, StoreError> {
        Ok(self.lock()?.values().map(|d| project(d, fields)).collect())
    }

    fn drop_all(&self) -> Result<(), StoreError> {
        self.lock()?.clear();
        Ok(())
    }
}
