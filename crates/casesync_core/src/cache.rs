//! Per-operation case cache.

use crate::case::{Case, CaseDocType};
use crate::config::CacheConfig;
use crate::error::CaseResult;
use crate::repository::Repository;
use crate::validator::CaseDocValidator;
use casesync_storage::StoredDocument;
use std::collections::HashMap;

/// A read-through cache of cases for one unit of work.
///
/// The cache:
/// - Lives for one form's processing or one restore, never longer
/// - Admits only cases accepted by its [`CaseDocValidator`]
/// - Hands out cases in first-touch order
///
/// All mutation goes through `&mut self`; a cache is owned by a single
/// operation and never shared.
#[derive(Debug)]
pub struct CaseDbCache<'a> {
    repo: &'a Repository,
    validator: CaseDocValidator,
    config: CacheConfig,
    cases: HashMap<String, Case>,
    order: Vec<String>,
}

impl<'a> CaseDbCache<'a> {
    /// Creates an empty cache.
    pub fn new(repo: &'a Repository, validator: CaseDocValidator, config: CacheConfig) -> Self {
        Self {
            repo,
            validator,
            config,
            cases: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Returns true if the case is already cached.
    #[must_use]
    pub fn contains(&self, case_id: &str) -> bool {
        self.cases.contains_key(case_id)
    }

    /// Returns the number of cached cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Returns a case, loading and validating it on first access.
    ///
    /// Returns `None` when storage has no document with this id.
    ///
    /// # Errors
    ///
    /// [`crate::CaseError::IllegalCaseId`] when the stored document fails
    /// validation.
    pub fn get(&mut self, case_id: &str) -> CaseResult<Option<&Case>> {
        Ok(self.get_mut(case_id)?.map(|case| &*case))
    }

    /// Mutable variant of [`CaseDbCache::get`].
    pub fn get_mut(&mut self, case_id: &str) -> CaseResult<Option<&mut Case>> {
        if !self.cases.contains_key(case_id) {
            let Some(doc) = self.repo.store().get(case_id)? else {
                return Ok(None);
            };
            let case = self.admit(&doc)?;
            self.insert(case);
        }
        Ok(self.cases.get_mut(case_id))
    }

    /// Adds a case created during this operation.
    pub fn set(&mut self, case: Case) -> CaseResult<()> {
        self.validator.check_domain(&case)?;
        self.insert(case);
        Ok(())
    }

    /// Loads every listed case not yet cached, in chunks.
    pub fn populate(&mut self, case_ids: &[String]) -> CaseResult<()> {
        let mut missing: Vec<String> = Vec::new();
        for id in case_ids {
            if !self.contains(id) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        for chunk in missing.chunks(self.config.populate_chunk_size) {
            for doc in self.repo.store().get_many(chunk)? {
                let case = self.admit(&doc)?;
                self.insert(case);
            }
        }
        Ok(())
    }

    /// Returns true if the id names a case that is cached or stored.
    pub fn doc_exists(&self, case_id: &str) -> CaseResult<bool> {
        if self.contains(case_id) {
            return Ok(true);
        }
        Ok(self
            .repo
            .store()
            .get(case_id)?
            .is_some_and(|doc| CaseDocType::from_doc_type(&doc.doc_type).is_some()))
    }

    /// Iterates cached cases in first-touch order.
    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.order.iter().filter_map(|id| self.cases.get(id))
    }

    /// Consumes the cache, returning cases in first-touch order.
    pub fn into_cases(mut self) -> Vec<Case> {
        self.order
            .iter()
            .filter_map(|id| self.cases.remove(id))
            .collect()
    }

    fn admit(&self, doc: &StoredDocument) -> CaseResult<Case> {
        self.validator.check_doc_type(&doc.id, &doc.doc_type)?;
        let case = Repository::decode_case(doc, self.config.strip_history)?;
        self.validator.check_domain(&case)?;
        Ok(case)
    }

    fn insert(&mut self, case: Case) {
        if !self.cases.contains_key(&case.case_id) {
            self.order.push(case.case_id.clone());
        }
        self.cases.insert(case.case_id.clone(), case);
    }
}
