//! Access validation for cases admitted into a cache.

use crate::case::{Case, CaseDocType};
use crate::error::{CaseError, CaseResult};

/// Decides whether a stored case may be used by the current operation.
///
/// Kept apart from [`crate::CaseDbCache`] so the cache stays a plain unit
/// of work; callers compose the two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseDocValidator {
    domain: Option<String>,
    deleted_ok: bool,
}

impl CaseDocValidator {
    /// Creates a validator.
    pub fn new(domain: Option<String>, deleted_ok: bool) -> Self {
        Self { domain, deleted_ok }
    }

    /// Returns the enforced domain.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Checks a stored document's type tag.
    ///
    /// # Errors
    ///
    /// [`CaseError::IllegalCaseId`] for non-case documents, and for
    /// tombstones unless deleted cases are allowed.
    pub fn check_doc_type(&self, case_id: &str, doc_type: &str) -> CaseResult<()> {
        match CaseDocType::from_doc_type(doc_type) {
            Some(CaseDocType::Case) => Ok(()),
            Some(CaseDocType::Deleted) if self.deleted_ok => Ok(()),
            Some(CaseDocType::Deleted) => {
                Err(CaseError::illegal_case_id(case_id, "case is deleted"))
            }
            None => Err(CaseError::illegal_case_id(
                case_id,
                format!("document is a {doc_type}, not a case"),
            )),
        }
    }

    /// Checks that a case belongs to the enforced domain.
    pub fn check_domain(&self, case: &Case) -> CaseResult<()> {
        match &self.domain {
            Some(domain) if case.domain.as_deref() != Some(domain.as_str()) => {
                Err(CaseError::illegal_case_id(
                    &case.case_id,
                    format!(
                        "case belongs to domain {}, not {domain}",
                        case.domain.as_deref().unwrap_or("<none>")
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}
