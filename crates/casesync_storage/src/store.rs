//! Document store trait definition.

use crate::document::{DocumentWrite, StoredDocument, WriteReceipt};
use crate::error::StorageResult;

/// The storage contract the sync core requires.
///
/// # Invariants
///
/// - `get` returns exactly the last written revision of a document
/// - `put` with a stale `expected_rev` fails with a conflict and leaves the
///   stored document untouched
/// - every successful write gets a change sequence strictly greater than all
///   previous writes, and [`DocumentStore::update_seq`] reports the latest
/// - view entries of a document always reflect its latest revision
/// - implementations must be `Send + Sync`
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by id. Returns `None` if it does not exist.
    fn get(&self, id: &str) -> StorageResult<Option<StoredDocument>>;

    /// Fetches several documents in one round trip.
    ///
    /// Missing ids are skipped; the result follows the order of `ids`.
    fn get_many(&self, ids: &[String]) -> StorageResult<Vec<StoredDocument>>;

    /// Returns true if a document with this id exists.
    fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Writes a document with an optimistic concurrency check.
    ///
    /// `expected_rev` is the revision the change is based on; `None` means
    /// the document must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Conflict`] if the stored revision
    /// differs from `expected_rev`.
    fn put(&self, write: DocumentWrite, expected_rev: Option<u64>) -> StorageResult<WriteReceipt>;

    /// Writes a document regardless of its current revision.
    fn force_put(&self, write: DocumentWrite) -> StorageResult<WriteReceipt>;

    /// Returns the ids of documents emitting `(view, key)`, sorted.
    fn query_view(&self, view: &str, key: &str) -> StorageResult<Vec<String>>;

    /// Returns the change sequence of the latest write (0 when empty).
    fn update_seq(&self) -> StorageResult<u64>;
}
