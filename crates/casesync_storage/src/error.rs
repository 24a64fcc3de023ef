//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Optimistic concurrency check failed.
    #[error("write conflict on document {id}: expected revision {expected:?}, found {actual:?}")]
    Conflict {
        /// The document being written.
        id: String,
        /// Revision the writer based its change on (`None` = create).
        expected: Option<u64>,
        /// Revision currently stored (`None` = absent).
        actual: Option<u64>,
    },

    /// Encoding or decoding a document body failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StorageError {
    /// Returns true if this is an optimistic concurrency failure.
    ///
    /// Conflicts are transient: re-reading the document and retrying the
    /// write is expected to succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
