//! Error types for the sync server.

use casesync_core::CaseError;
use casesync_sync_protocol::{CaseStateHash, SyncLogError};
use thiserror::Error;

/// Result type for form processing.
pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Result type for restores.
pub type RestoreResult<T> = Result<T, RestoreError>;

/// Errors that can occur while processing a submitted form.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// A form with this id was already stored.
    #[error("form {form_id} was already submitted")]
    DuplicateForm {
        /// The form id.
        form_id: String,
    },

    /// Case processing failed.
    #[error(transparent)]
    Case(#[from] CaseError),

    /// Sync log handling failed.
    #[error(transparent)]
    SyncLog(#[from] SyncLogError),
}

impl ProcessingError {
    /// Returns true if the form violated case integrity.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Self::Case(e) if e.is_integrity_error())
    }

    /// Returns true if the submission can be retried (write conflicts).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Case(e) => e.is_retryable(),
            Self::SyncLog(e) => e.is_retryable(),
            Self::DuplicateForm { .. } => false,
        }
    }
}

/// Errors that can occur while producing a restore.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// The requested protocol version is not supported.
    #[error("unsupported restore version: {version}")]
    BadVersion {
        /// The requested version.
        version: String,
    },

    /// The client's claimed state differs from its sync log.
    #[error(
        "phone case list is inconsistent with server's records: expected {expected}, got {actual}"
    )]
    Consistency {
        /// Hash of the sync log's footprint.
        expected: CaseStateHash,
        /// Hash the client sent.
        actual: CaseStateHash,
        /// The sync log's footprint.
        case_ids: Vec<String>,
    },

    /// Sync log lookup or parsing failed.
    #[error(transparent)]
    SyncLog(#[from] SyncLogError),

    /// Case access failed.
    #[error(transparent)]
    Case(#[from] CaseError),
}

impl RestoreError {
    /// Returns true if the request itself was at fault (precondition
    /// failed); the client should restore from scratch.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadVersion { .. }
                | Self::Consistency { .. }
                | Self::SyncLog(SyncLogError::BadStateHash { .. } | SyncLogError::NotFound { .. })
        )
    }

    /// Returns true if this is a server-side failure.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_storage::StorageError;

    #[test]
    fn processing_classification() {
        let dangling = ProcessingError::from(CaseError::DanglingIndex {
            case_id: "c2".into(),
            referenced_id: "c99".into(),
        });
        assert!(dangling.is_integrity_error());
        assert!(!dangling.is_retryable());

        let conflict = ProcessingError::from(SyncLogError::Storage(StorageError::Conflict {
            id: "log".into(),
            expected: Some(1),
            actual: Some(2),
        }));
        assert!(conflict.is_retryable());
    }

    #[test]
    fn restore_classification() {
        assert!(RestoreError::BadVersion {
            version: "9.0".into()
        }
        .is_client_error());
        let hash = CaseStateHash::compute(["a"]);
        let mismatch = RestoreError::Consistency {
            expected: hash.clone(),
            actual: hash,
            case_ids: vec!["a".into()],
        };
        assert!(mismatch.is_client_error());
        assert!(mismatch.to_string().contains("ccsh:"));

        let storage = RestoreError::Case(CaseError::Storage(StorageError::Codec("x".into())));
        assert!(storage.is_server_error());
    }
}
