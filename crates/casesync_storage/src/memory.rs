//! In-memory document store.

use crate::document::{DocumentWrite, StoredDocument, ViewEntry, WriteReceipt};
use crate::error::{StorageError, StorageResult};
use crate::store::DocumentStore;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// An in-memory document store.
///
/// This store keeps all documents and view entries in memory and is
/// suitable for:
/// - Unit tests
/// - Integration tests
/// - Embedding the sync core in a process that persists elsewhere
///
/// # Thread Safety
///
/// All state lives behind a single `RwLock`, so a write (document, views and
/// change sequence) is observed atomically by readers.
///
/// # Example
///
/// ```rust
/// use casesync_storage::{DocumentStore, DocumentWrite, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// let first = store.put(DocumentWrite::new("a", "Note", vec![1]), None).unwrap();
/// let second = store.put(DocumentWrite::new("a", "Note", vec![2]), Some(first.rev)).unwrap();
/// assert_eq!(second.rev, 2);
/// assert!(store.put(DocumentWrite::new("a", "Note", vec![3]), Some(first.rev)).is_err());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<String, Entry>,
    views: HashMap<(String, String), BTreeSet<String>>,
    seq: u64,
}

#[derive(Debug)]
struct Entry {
    doc: StoredDocument,
    views: Vec<ViewEntry>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    /// Returns true if the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().docs.is_empty()
    }

    /// Returns the ids of all documents with the given type tag, sorted.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn ids_of_type(&self, doc_type: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut ids: Vec<String> = inner
            .docs
            .values()
            .filter(|e| e.doc.doc_type == doc_type)
            .map(|e| e.doc.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Inner {
    fn write(&mut self, write: DocumentWrite) -> WriteReceipt {
        let rev = self.docs.get(&write.id).map_or(0, |e| e.doc.rev) + 1;
        self.seq += 1;
        let seq = self.seq;

        if let Some(old) = self.docs.get(&write.id) {
            for entry in &old.views {
                let key = (entry.view.clone(), entry.key.clone());
                if let Some(ids) = self.views.get_mut(&key) {
                    ids.remove(&write.id);
                    if ids.is_empty() {
                        self.views.remove(&key);
                    }
                }
            }
        }
        for entry in &write.views {
            self.views
                .entry((entry.view.clone(), entry.key.clone()))
                .or_default()
                .insert(write.id.clone());
        }

        let doc = StoredDocument {
            id: write.id.clone(),
            doc_type: write.doc_type,
            rev,
            seq,
            body: write.body,
        };
        self.docs.insert(
            write.id,
            Entry {
                doc,
                views: write.views,
            },
        );
        WriteReceipt { rev, seq }
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, id: &str) -> StorageResult<Option<StoredDocument>> {
        Ok(self.inner.read().docs.get(id).map(|e| e.doc.clone()))
    }

    fn get_many(&self, ids: &[String]) -> StorageResult<Vec<StoredDocument>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.docs.get(id).map(|e| e.doc.clone()))
            .collect())
    }

    fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.inner.read().docs.contains_key(id))
    }

    fn put(&self, write: DocumentWrite, expected_rev: Option<u64>) -> StorageResult<WriteReceipt> {
        let mut inner = self.inner.write();
        let actual = inner.docs.get(&write.id).map(|e| e.doc.rev);
        if actual != expected_rev {
            return Err(StorageError::Conflict {
                id: write.id,
                expected: expected_rev,
                actual,
            });
        }
        Ok(inner.write(write))
    }

    fn force_put(&self, write: DocumentWrite) -> StorageResult<WriteReceipt> {
        Ok(self.inner.write().write(write))
    }

    fn query_view(&self, view: &str, key: &str) -> StorageResult<Vec<String>> {
        let inner = self.inner.read();
        Ok(inner
            .views
            .get(&(view.to_string(), key.to_string()))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn update_seq(&self) -> StorageResult<u64> {
        Ok(self.inner.read().seq)
    }
}
