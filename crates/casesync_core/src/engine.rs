//! The case update engine: folds a form's case blocks into cases.

use crate::cache::CaseDbCache;
use crate::case::Case;
use crate::config::{CacheConfig, CaseSettings};
use crate::error::{CaseError, CaseResult};
use crate::form::Form;
use crate::repository::Repository;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Applies forms to cases.
///
/// The engine only computes case effects; persisting them, updating sync
/// logs and notifying listeners is the caller's pipeline.
#[derive(Debug, Clone)]
pub struct CaseUpdateEngine {
    repo: Repository,
    settings: CaseSettings,
}

impl CaseUpdateEngine {
    /// Creates an engine.
    pub fn new(repo: Repository, settings: CaseSettings) -> Self {
        Self { repo, settings }
    }

    /// Returns the repository.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Returns the settings.
    pub fn settings(&self) -> &CaseSettings {
        &self.settings
    }

    /// Applies every case block of a form and returns the touched cases in
    /// first-touch order. Nothing is saved.
    ///
    /// A case whose `xform_ids` already holds this form when it is first
    /// loaded is left alone, so reprocessing a processed form is a no-op.
    ///
    /// # Errors
    ///
    /// - [`CaseError::NoDomainProvided`] if domain checks are enforced and
    ///   the form has no domain
    /// - [`CaseError::IllegalCaseId`] if a block targets a case the form may
    ///   not touch
    /// - [`CaseError::DanglingIndex`] if an index of a touched case names a
    ///   case that does not exist
    pub fn get_or_update_cases(&self, form: &Form) -> CaseResult<Vec<Case>> {
        let domain = check_form_domain(form, &self.settings)?;
        let config = match domain {
            Some(domain) => CacheConfig::new().domain(domain),
            None => CacheConfig::new(),
        };
        let mut cache = CaseDbCache::new(&self.repo, config.validator(), config);
        let applied_seq = self.repo.update_seq()?;
        let mut already_applied: HashSet<String> = HashSet::new();

        for update in form.case_updates() {
            let first_sight = !cache.contains(&update.id);
            match cache.get_mut(&update.id)? {
                Some(case) => {
                    if first_sight && case.has_form(&form.id) {
                        already_applied.insert(update.id.clone());
                    }
                    if already_applied.contains(&update.id) {
                        debug!(form_id = %form.id, case_id = %update.id, "form already applied");
                        continue;
                    }
                    case.update_from_case_update(&update, form, applied_seq);
                }
                None => {
                    if !update.creates_case() {
                        warn!(
                            form_id = %form.id,
                            case_id = %update.id,
                            "case block for unknown case has no create action"
                        );
                    }
                    cache.set(Case::from_case_update(&update, form, applied_seq))?;
                }
            }
        }

        for case in cache.cases() {
            for index in &case.indices {
                if !cache.doc_exists(&index.referenced_id)? {
                    return Err(CaseError::DanglingIndex {
                        case_id: case.case_id.clone(),
                        referenced_id: index.referenced_id.clone(),
                    });
                }
            }
        }

        Ok(cache.into_cases())
    }
}

/// Returns the form's domain, enforcing its presence when configured.
pub fn check_form_domain<'f>(form: &'f Form, settings: &CaseSettings) -> CaseResult<Option<&'f str>> {
    match form.domain.as_deref() {
        None if settings.force_domain_check => Err(CaseError::NoDomainProvided {
            form_id: form.id.clone(),
        }),
        domain => Ok(domain),
    }
}

/// Loads every existing case a form references, asserting the form's
/// domain on each.
pub fn cases_referenced_by_form(
    repo: &Repository,
    form: &Form,
    settings: &CaseSettings,
) -> CaseResult<Vec<Case>> {
    let domain = check_form_domain(form, settings)?;
    let config = match domain {
        Some(domain) => CacheConfig::new().domain(domain).deleted_ok(true),
        None => CacheConfig::new().deleted_ok(true),
    };
    let mut cache = CaseDbCache::new(repo, config.validator(), config);
    cache.populate(&form.case_ids())?;
    Ok(cache.into_cases())
}
