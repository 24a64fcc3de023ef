//! Rebuilding a case from the forms that reference it.

use crate::case::{Case, CaseDocType};
use crate::error::{CaseError, CaseResult};
use crate::form::Form;
use crate::repository::Repository;
use tracing::info;

/// Rebuilds a case from scratch and saves it.
///
/// The forms are found through the form-to-case reverse index rather than
/// the case's own `xform_ids`, so forms that never made it onto the case are
/// included. Only submitted forms count. They are replayed in
/// `received_on` order (ties broken by id), applying only the blocks
/// addressed to this case. A case left with no valid form is tombstoned,
/// never erased.
///
/// Rebuilding twice gives the same case.
///
/// # Errors
///
/// - [`CaseError::CaseNotFound`] if no case document exists
/// - [`CaseError::IllegalCaseId`] if a replayed form belongs to another
///   domain
pub fn rebuild_case(repo: &Repository, case_id: &str) -> CaseResult<Case> {
    let mut case = repo
        .get_case(case_id)?
        .ok_or_else(|| CaseError::CaseNotFound {
            case_id: case_id.to_string(),
        })?;

    let form_ids = repo.form_ids_for_case(case_id)?;
    let mut forms: Vec<Form> = repo
        .get_forms(&form_ids)?
        .into_iter()
        .filter(Form::is_submitted)
        .collect();
    forms.sort_by(|a, b| {
        a.received_on
            .cmp(&b.received_on)
            .then_with(|| a.id.cmp(&b.id))
    });

    let applied_seq = repo.update_seq()?;
    case.reset();
    for form in &forms {
        if form.domain != case.domain {
            return Err(CaseError::illegal_case_id(
                case_id,
                format!("form {} belongs to another domain", form.id),
            ));
        }
        for update in form.case_updates().iter().filter(|u| u.id == case_id) {
            case.update_from_case_update(update, form, applied_seq);
        }
    }

    case.xform_ids = forms.iter().map(|f| f.id.clone()).collect();
    case.doc_type = if forms.is_empty() {
        CaseDocType::Deleted
    } else {
        CaseDocType::Case
    };
    repo.force_save_case(&mut case)?;
    info!(
        case_id,
        forms = forms.len(),
        deleted = case.is_deleted(),
        "rebuilt case"
    );
    Ok(case)
}
