//! Error types for casesync core.

use casesync_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CaseResult<T> = Result<T, CaseError>;

/// Errors that can occur while processing cases.
#[derive(Debug, Error)]
pub enum CaseError {
    /// A case id was used for a document the caller may not touch.
    #[error("illegal case id {case_id}: {reason}")]
    IllegalCaseId {
        /// The offending id.
        case_id: String,
        /// Why access was refused.
        reason: String,
    },

    /// A case index points at a case that does not exist.
    #[error(
        "submitted index against an unknown case id: {referenced_id} (indexed from {case_id}); \
         the phone's case database is likely corrupt and should be restored from the server"
    )]
    DanglingIndex {
        /// The case carrying the index.
        case_id: String,
        /// The missing referenced case.
        referenced_id: String,
    },

    /// A form arrived without a domain while domain checks are enforced.
    #[error("no domain provided for form {form_id}")]
    NoDomainProvided {
        /// The form lacking a domain.
        form_id: String,
    },

    /// A case block could not be turned into a case update.
    #[error("malformed case block: {message}")]
    MalformedCaseBlock {
        /// Description of the problem.
        message: String,
    },

    /// Case not found.
    #[error("case not found: {case_id}")]
    CaseNotFound {
        /// The missing case id.
        case_id: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CaseError {
    /// Creates an illegal case id error.
    pub fn illegal_case_id(case_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IllegalCaseId {
            case_id: case_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed case block error.
    pub fn malformed_block(message: impl Into<String>) -> Self {
        Self::MalformedCaseBlock {
            message: message.into(),
        }
    }

    /// Returns true if this error is an integrity violation.
    ///
    /// Integrity errors are fatal to the triggering operation and are never
    /// retried automatically.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            CaseError::IllegalCaseId { .. }
                | CaseError::DanglingIndex { .. }
                | CaseError::NoDomainProvided { .. }
        )
    }

    /// Returns true if the operation can be retried (write conflicts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaseError::Storage(e) if e.is_conflict())
    }
}
