//! Sync log persistence.

use crate::error::{SyncLogError, SyncLogResult};
use crate::sync_log::SyncLog;
use casesync_core::views;
use casesync_storage::{decode, encode, DocumentStore, DocumentWrite, StoredDocument, ViewEntry};
use std::fmt;
use std::sync::Arc;

/// Reads and writes sync logs.
#[derive(Clone)]
pub struct SyncLogStore {
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for SyncLogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncLogStore").finish_non_exhaustive()
    }
}

impl SyncLogStore {
    /// Storage type tag of sync log documents.
    pub const DOC_TYPE: &'static str = "SyncLog";

    /// Wraps a store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn decode_log(doc: &StoredDocument) -> SyncLogResult<SyncLog> {
        if doc.doc_type != Self::DOC_TYPE {
            return Err(SyncLogError::WrongDocType {
                id: doc.id.clone(),
                doc_type: doc.doc_type.clone(),
            });
        }
        let mut log: SyncLog = decode(&doc.body)?;
        log.rev = Some(doc.rev);
        Ok(log)
    }

    /// Loads a sync log.
    pub fn get(&self, id: &str) -> SyncLogResult<Option<SyncLog>> {
        self.store
            .get(id)?
            .map(|doc| Self::decode_log(&doc))
            .transpose()
    }

    /// Loads a sync log that must exist.
    ///
    /// # Errors
    ///
    /// [`SyncLogError::NotFound`] if it does not.
    pub fn fetch(&self, id: &str) -> SyncLogResult<SyncLog> {
        self.get(id)?.ok_or_else(|| SyncLogError::NotFound { id: id.to_string() })
    }

    /// Saves a sync log with an optimistic revision check. A log that was
    /// never saved is created.
    ///
    /// # Errors
    ///
    /// A retryable storage conflict if the log changed since it was loaded.
    pub fn save(&self, log: &mut SyncLog) -> SyncLogResult<()> {
        let write = DocumentWrite::new(&log.id, Self::DOC_TYPE, encode(log)?)
            .with_view(ViewEntry::new(views::SYNC_LOGS_BY_USER, &log.user_id));
        let receipt = self.store.put(write, log.rev)?;
        log.rev = Some(receipt.rev);
        Ok(())
    }

    /// Returns the ids of a user's sync logs.
    pub fn ids_for_user(&self, user_id: &str) -> SyncLogResult<Vec<String>> {
        Ok(self.store.query_view(views::SYNC_LOGS_BY_USER, user_id)?)
    }
}
