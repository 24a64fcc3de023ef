//! Typed access to cases and forms in a [`DocumentStore`].

use crate::case::{Case, CaseDocType, CaseLite};
use crate::error::{CaseError, CaseResult};
use crate::form::{Form, FormDisposition};
use casesync_storage::{decode, encode, DocumentStore, DocumentWrite, StoredDocument, ViewEntry};
use std::fmt;
use std::sync::Arc;

/// Names of the secondary views maintained by writers.
pub mod views {
    /// Case id to ids of the forms referencing it.
    pub const FORM_CASE_INDEX: &str = "form_case_index";
    /// Owner id to ids of the live cases it owns.
    pub const CASE_BY_OWNER: &str = "case_by_owner";
    /// User id to ids of that user's sync logs.
    pub const SYNC_LOGS_BY_USER: &str = "sync_logs_by_user";
}

/// Reads and writes cases and forms, maintaining their views.
///
/// Cloning is cheap; clones share the underlying store.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    /// Wraps a store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Returns the store's change sequence.
    pub fn update_seq(&self) -> CaseResult<u64> {
        Ok(self.store.update_seq()?)
    }

    // ========================================================================
    // Cases
    // ========================================================================

    /// Decodes a stored case, full or through the lite projection.
    ///
    /// # Errors
    ///
    /// Returns [`CaseError::IllegalCaseId`] if the document is not a case.
    pub fn decode_case(doc: &StoredDocument, strip_history: bool) -> CaseResult<Case> {
        let doc_type = CaseDocType::from_doc_type(&doc.doc_type).ok_or_else(|| {
            CaseError::illegal_case_id(&doc.id, format!("document is a {}", doc.doc_type))
        })?;
        let mut case: Case = if strip_history {
            decode::<CaseLite>(&doc.body)?.into()
        } else {
            decode(&doc.body)?
        };
        case.doc_type = doc_type;
        case.rev = Some(doc.rev);
        case.seq = doc.seq;
        Ok(case)
    }

    /// Loads a case (live or tombstoned) with its full history.
    pub fn get_case(&self, case_id: &str) -> CaseResult<Option<Case>> {
        self.store
            .get(case_id)?
            .map(|doc| Self::decode_case(&doc, false))
            .transpose()
    }

    /// Loads several cases, skipping missing ids.
    pub fn get_cases(&self, case_ids: &[String], strip_history: bool) -> CaseResult<Vec<Case>> {
        self.store
            .get_many(case_ids)?
            .iter()
            .map(|doc| Self::decode_case(doc, strip_history))
            .collect()
    }

    /// Saves a case if its revision is current.
    ///
    /// # Errors
    ///
    /// Returns a retryable storage conflict if the case changed since it was
    /// loaded.
    pub fn save_case(&self, case: &mut Case) -> CaseResult<()> {
        let receipt = self.store.put(Self::case_write(case)?, case.rev)?;
        case.rev = Some(receipt.rev);
        case.seq = receipt.seq;
        Ok(())
    }

    /// Saves a case regardless of its revision.
    pub fn force_save_case(&self, case: &mut Case) -> CaseResult<()> {
        let receipt = self.store.force_put(Self::case_write(case)?)?;
        case.rev = Some(receipt.rev);
        case.seq = receipt.seq;
        Ok(())
    }

    fn case_write(case: &Case) -> CaseResult<DocumentWrite> {
        let mut write = DocumentWrite::new(&case.case_id, case.doc_type.as_str(), encode(case)?);
        if !case.is_deleted() {
            write = write.with_view(ViewEntry::new(views::CASE_BY_OWNER, case.effective_owner()));
        }
        Ok(write)
    }

    /// Returns the ids of live cases owned by `owner_id`.
    pub fn case_ids_by_owner(&self, owner_id: &str) -> CaseResult<Vec<String>> {
        Ok(self.store.query_view(views::CASE_BY_OWNER, owner_id)?)
    }

    // ========================================================================
    // Forms
    // ========================================================================

    fn decode_form(doc: &StoredDocument) -> CaseResult<Form> {
        let disposition = FormDisposition::from_doc_type(&doc.doc_type).ok_or_else(|| {
            CaseError::malformed_block(format!("{} is a {}, not a form", doc.id, doc.doc_type))
        })?;
        let mut form: Form = decode(&doc.body)?;
        form.disposition = disposition;
        form.rev = Some(doc.rev);
        Ok(form)
    }

    /// Loads a form.
    pub fn get_form(&self, form_id: &str) -> CaseResult<Option<Form>> {
        self.store
            .get(form_id)?
            .map(|doc| Self::decode_form(&doc))
            .transpose()
    }

    /// Loads several forms, skipping missing ids.
    pub fn get_forms(&self, form_ids: &[String]) -> CaseResult<Vec<Form>> {
        self.store
            .get_many(form_ids)?
            .iter()
            .map(Self::decode_form)
            .collect()
    }

    /// Stores a new form.
    ///
    /// # Errors
    ///
    /// Returns a storage conflict if a document with the form's id exists.
    pub fn create_form(&self, form: &mut Form) -> CaseResult<()> {
        let receipt = self.store.put(Self::form_write(form)?, None)?;
        form.rev = Some(receipt.rev);
        Ok(())
    }

    /// Saves a form if its revision is current.
    pub fn save_form(&self, form: &mut Form) -> CaseResult<()> {
        let receipt = self.store.put(Self::form_write(form)?, form.rev)?;
        form.rev = Some(receipt.rev);
        Ok(())
    }

    /// Saves a form regardless of its revision.
    pub fn force_save_form(&self, form: &mut Form) -> CaseResult<()> {
        let receipt = self.store.force_put(Self::form_write(form)?)?;
        form.rev = Some(receipt.rev);
        Ok(())
    }

    fn form_write(form: &Form) -> CaseResult<DocumentWrite> {
        let entries: Vec<ViewEntry> = form
            .case_ids()
            .into_iter()
            .map(|case_id| ViewEntry::new(views::FORM_CASE_INDEX, case_id))
            .collect();
        Ok(DocumentWrite::new(&form.id, form.disposition.as_str(), encode(form)?).with_views(entries))
    }

    /// Returns the ids of every form referencing a case, whatever their
    /// disposition.
    pub fn form_ids_for_case(&self, case_id: &str) -> CaseResult<Vec<String>> {
        Ok(self.store.query_view(views::FORM_CASE_INDEX, case_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_storage::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn repo() -> Repository {
        Repository::new(Arc::new(InMemoryStore::new()))
    }

    fn form(id: &str, body: serde_json::Value) -> Form {
        Form::new(id, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), body)
    }

    #[test]
    fn case_save_and_reload() {
        let repo = repo();
        let mut case = Case::new("c1", Some("demo".into()));
        case.owner_id = "o1".into();
        repo.save_case(&mut case).unwrap();
        assert_eq!(case.rev, Some(1));

        let loaded = repo.get_case("c1").unwrap().unwrap();
        assert_eq!(loaded.rev, Some(1));
        assert_eq!(loaded.domain.as_deref(), Some("demo"));
        assert_eq!(repo.case_ids_by_owner("o1").unwrap(), vec!["c1"]);
    }

    #[test]
    fn stale_case_save_is_retryable() {
        let repo = repo();
        let mut case = Case::new("c1", None);
        repo.save_case(&mut case).unwrap();
        let mut stale = case.clone();
        repo.save_case(&mut case).unwrap();

        let err = repo.save_case(&mut stale).unwrap_err();
        assert!(err.is_retryable());
        repo.force_save_case(&mut stale).unwrap();
        assert_eq!(stale.rev, Some(3));
    }

    #[test]
    fn tombstones_leave_owner_view() {
        let repo = repo();
        let mut case = Case::new("c1", None);
        case.owner_id = "o1".into();
        repo.save_case(&mut case).unwrap();
        case.doc_type = CaseDocType::Deleted;
        repo.save_case(&mut case).unwrap();

        assert!(repo.case_ids_by_owner("o1").unwrap().is_empty());
        let loaded = repo.get_case("c1").unwrap().unwrap();
        assert!(loaded.is_deleted());
    }

    #[test]
    fn form_case_index_view() {
        let repo = repo();
        let mut f1 = form("f1", json!({"case": [{"@case_id": "a"}, {"@case_id": "b"}]}));
        let mut f2 = form("f2", json!({"case": {"@case_id": "b"}}));
        repo.create_form(&mut f1).unwrap();
        repo.create_form(&mut f2).unwrap();

        assert_eq!(repo.form_ids_for_case("a").unwrap(), vec!["f1"]);
        assert_eq!(repo.form_ids_for_case("b").unwrap(), vec!["f1", "f2"]);
        assert!(repo.create_form(&mut f1.clone()).unwrap_err().is_retryable());
    }

    #[test]
    fn form_disposition_round_trips_through_doc_type() {
        let repo = repo();
        let mut f = form("f1", json!({}));
        repo.create_form(&mut f).unwrap();
        f.mark_error("boom");
        repo.save_form(&mut f).unwrap();

        let loaded = repo.get_form("f1").unwrap().unwrap();
        assert_eq!(loaded.disposition, FormDisposition::Error);
        assert_eq!(loaded.problem.as_deref(), Some("boom"));
        assert_eq!(repo.store().get("f1").unwrap().unwrap().doc_type, "XFormError");
    }

    #[test]
    fn non_case_document_is_rejected() {
        let repo = repo();
        let mut f = form("f1", json!({}));
        repo.create_form(&mut f).unwrap();
        let err = repo.get_case("f1").unwrap_err();
        assert!(matches!(err, CaseError::IllegalCaseId { .. }));
    }
}
