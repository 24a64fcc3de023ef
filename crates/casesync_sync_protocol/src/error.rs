//! Sync log errors.

use casesync_storage::StorageError;
use thiserror::Error;

/// Result type for sync log operations.
pub type SyncLogResult<T> = Result<T, SyncLogError>;

/// Errors raised by sync logs.
#[derive(Debug, Error)]
pub enum SyncLogError {
    /// A form disagrees with what the sync log says the phone holds.
    #[error("sync log assertion failed for case {case_id}: {message}")]
    Assertion {
        /// The case the assertion is about.
        case_id: String,
        /// What was expected.
        message: String,
    },

    /// A claimed state hash could not be parsed.
    #[error("malformed case state hash: {value}")]
    BadStateHash {
        /// The claimed value.
        value: String,
    },

    /// Sync log not found.
    #[error("sync log not found: {id}")]
    NotFound {
        /// The requested id.
        id: String,
    },

    /// The document is not a sync log.
    #[error("document {id} is a {doc_type}, not a sync log")]
    WrongDocType {
        /// The document id.
        id: String,
        /// Its type tag.
        doc_type: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncLogError {
    /// Creates an assertion error.
    pub fn assertion(case_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Assertion {
            case_id: case_id.into(),
            message: message.into(),
        }
    }

    /// Returns the case id if this is an assertion failure.
    pub fn assertion_case_id(&self) -> Option<&str> {
        match self {
            Self::Assertion { case_id, .. } => Some(case_id),
            _ => None,
        }
    }

    /// Returns true if the operation can be retried (write conflicts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_conflict())
    }
}
