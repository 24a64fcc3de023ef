//! The form processing pipeline.

use crate::config::ServerConfig;
use crate::error::{ProcessingError, ProcessingResult};
use casesync_core::{
    rebuild_case, Case, CaseError, CaseProcessingConfig, CaseUpdateEngine, CasesReceivedFeed,
    Form, FormDisposition, Repository,
};
use casesync_sync_protocol::{SyncLog, SyncLogStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs submitted forms through case processing and sync log checks.
#[derive(Debug)]
pub struct FormProcessor {
    engine: CaseUpdateEngine,
    logs: SyncLogStore,
    listeners: Arc<CasesReceivedFeed>,
    processing: CaseProcessingConfig,
}

impl FormProcessor {
    /// Creates a processor over a repository.
    pub fn new(repo: Repository, config: &ServerConfig, listeners: Arc<CasesReceivedFeed>) -> Self {
        let logs = SyncLogStore::new(Arc::clone(repo.store()));
        Self {
            engine: CaseUpdateEngine::new(repo, config.case_settings.clone()),
            logs,
            listeners,
            processing: config.processing.clone(),
        }
    }

    /// Returns the repository.
    pub fn repository(&self) -> &Repository {
        self.engine.repository()
    }

    /// Returns the sync log store.
    pub fn sync_logs(&self) -> &SyncLogStore {
        &self.logs
    }

    /// Stores a new form and processes it. Returns the cases it touched.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::DuplicateForm`] if the form id is taken
    /// - an integrity error if the form's case effects are invalid; the form
    ///   is kept, marked as an error
    pub fn submit(&self, mut form: Form) -> ProcessingResult<Vec<Case>> {
        match self.repository().create_form(&mut form) {
            Ok(()) => {}
            Err(CaseError::Storage(e)) if e.is_conflict() => {
                return Err(ProcessingError::DuplicateForm { form_id: form.id });
            }
            Err(e) => return Err(e.into()),
        }
        debug!(form_id = %form.id, "form stored");
        let mut blacklist = HashSet::new();
        let mut in_flight = HashSet::new();
        self.process_cases(&mut form, &self.processing, &mut blacklist, &mut in_flight)
    }

    /// Processes a stored form.
    ///
    /// `blacklist` holds cases already reconciled during this submission;
    /// a sync log assertion on one of them is not reconciled again.
    /// `in_flight` holds the forms whose processing is under way further up
    /// the call chain; reconciliation never reprocesses them.
    ///
    /// Listeners are notified, and the form marked processed, only the first
    /// time the form completes.
    pub fn process_cases(
        &self,
        form: &mut Form,
        config: &CaseProcessingConfig,
        blacklist: &mut HashSet<String>,
        in_flight: &mut HashSet<String>,
    ) -> ProcessingResult<Vec<Case>> {
        in_flight.insert(form.id.clone());
        let result = self.apply_form(form, config, blacklist, in_flight);
        in_flight.remove(&form.id);
        result
    }

    fn apply_form(
        &self,
        form: &mut Form,
        config: &CaseProcessingConfig,
        blacklist: &mut HashSet<String>,
        in_flight: &mut HashSet<String>,
    ) -> ProcessingResult<Vec<Case>> {
        let mut cases = match self.engine.get_or_update_cases(form) {
            Ok(cases) => cases,
            Err(e) if e.is_integrity_error() => {
                warn!(form_id = %form.id, error = %e, "form failed case processing");
                form.mark_error(e.to_string());
                self.repository().save_form(form)?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        if config.reconcile {
            for case in &mut cases {
                case.reconcile_actions();
            }
        }
        for case in &mut cases {
            self.repository().force_save_case(case)?;
        }

        if let Some(token) = form.last_sync_token.clone() {
            match self.logs.get(&token)? {
                Some(log) => {
                    self.update_sync_log_with_checks(log, form, &cases, config, blacklist, in_flight)?
                }
                None => warn!(form_id = %form.id, sync_log_id = %token, "form references unknown sync log"),
            }
        }

        if form.initial_processing_complete {
            debug!(form_id = %form.id, "form reprocessed");
            return Ok(cases);
        }
        self.listeners.publish(form, &cases);

        form.initial_processing_complete = true;
        self.repository().save_form(form)?;
        debug!(form_id = %form.id, cases = cases.len(), "form processed");
        Ok(cases)
    }

    /// Applies a form's case effects to the client's sync log. When the log
    /// contradicts the form, the offending case's other forms are
    /// reprocessed, the case is rebuilt and the update retried.
    fn update_sync_log_with_checks(
        &self,
        mut log: SyncLog,
        form: &Form,
        cases: &[Case],
        config: &CaseProcessingConfig,
        blacklist: &mut HashSet<String>,
        in_flight: &mut HashSet<String>,
    ) -> ProcessingResult<()> {
        loop {
            let mut attempt = log.clone();
            let error = match attempt.update_phone_lists(&form.id, cases, config.strict_asserts) {
                Ok(changed) => return self.finish_log_update(attempt, changed, config),
                Err(e) => e,
            };
            let Some(case_id) = error.assertion_case_id().map(str::to_string) else {
                return Err(error.into());
            };

            if !blacklist.insert(case_id.clone()) {
                warn!(
                    sync_log_id = %log.id,
                    form_id = %form.id,
                    case_id = %case_id,
                    "case already reconciled, updating sync log leniently"
                );
                let changed = log.update_phone_lists(&form.id, cases, false)?;
                return self.finish_log_update(log, changed, config);
            }

            warn!(
                sync_log_id = %log.id,
                form_id = %form.id,
                case_id = %case_id,
                error = %error,
                "sync log disagrees with form, reconciling case"
            );
            self.reprocess_case_forms(&case_id, blacklist, in_flight)?;
            rebuild_case(self.repository(), &case_id)?;
            log = self.logs.fetch(&log.id)?;
        }
    }

    fn finish_log_update(
        &self,
        mut log: SyncLog,
        mut changed: bool,
        config: &CaseProcessingConfig,
    ) -> ProcessingResult<()> {
        if config.reconcile {
            changed |= log.prune_dependent_cases();
        }
        if changed {
            self.logs.save(&mut log)?;
        }
        Ok(())
    }

    /// Reprocesses every submitted or failed form of a case that is not
    /// in flight, with strict assertions. Failed forms that now succeed
    /// become submitted.
    fn reprocess_case_forms(
        &self,
        case_id: &str,
        blacklist: &mut HashSet<String>,
        in_flight: &mut HashSet<String>,
    ) -> ProcessingResult<()> {
        let strict = CaseProcessingConfig::new().strict_asserts(true);
        let form_ids: Vec<String> = self
            .repository()
            .form_ids_for_case(case_id)?
            .into_iter()
            .filter(|id| !in_flight.contains(id))
            .collect();

        for mut other in self.repository().get_forms(&form_ids)? {
            let was_error = match other.disposition {
                FormDisposition::Submitted => false,
                FormDisposition::Error => true,
                FormDisposition::Invalid => continue,
            };
            debug!(form_id = %other.id, case_id, "reprocessing form");
            match self.process_cases(&mut other, &strict, blacklist, in_flight) {
                Ok(_) if was_error => {
                    other.disposition = FormDisposition::Submitted;
                    other.problem = None;
                    self.repository().save_form(&mut other)?;
                    info!(form_id = %other.id, case_id, "failed form now processes cleanly");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(form_id = %other.id, case_id, error = %e, "form failed reprocessing");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_core::{CasesReceivedListener, ListenerError};
    use casesync_storage::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    fn processor() -> FormProcessor {
        let repo = Repository::new(Arc::new(InMemoryStore::new()));
        FormProcessor::new(repo, &ServerConfig::default(), Arc::new(CasesReceivedFeed::new()))
    }

    fn form(id: &str, minute: u32, body: Value) -> Form {
        Form::new(id, Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(), body)
            .with_domain("demo")
            .with_user_id("foo")
    }

    fn empty_log(processor: &FormProcessor) -> SyncLog {
        let mut log = SyncLog::new("foo", 0);
        processor.sync_logs().save(&mut log).unwrap();
        log
    }

    #[test]
    fn submit_marks_form_processed() {
        let processor = processor();
        let cases = processor
            .submit(form("f1", 0, json!({"case": {"@case_id": "c1", "create": {"case_type": "t"}}})))
            .unwrap();
        assert_eq!(cases.len(), 1);

        let stored = processor.repository().get_form("f1").unwrap().unwrap();
        assert!(stored.initial_processing_complete);
        assert!(stored.is_submitted());
        assert!(processor.repository().get_case("c1").unwrap().is_some());
    }

    #[test]
    fn duplicate_submission_is_rejected() {
        let processor = processor();
        let body = json!({"case": {"@case_id": "c1", "create": {}}});
        processor.submit(form("f1", 0, body.clone())).unwrap();
        let err = processor.submit(form("f1", 0, body)).unwrap_err();
        assert!(matches!(err, ProcessingError::DuplicateForm { ref form_id } if form_id == "f1"));
    }

    #[test]
    fn integrity_failure_marks_form_error() {
        let processor = processor();
        let err = processor
            .submit(form("f1", 0, json!({"case": {"@case_id": "c2", "create": {},
                "index": {"parent": {"@case_type": "t", "#text": "c99"}}}})))
            .unwrap_err();
        assert!(err.is_integrity_error());

        let stored = processor.repository().get_form("f1").unwrap().unwrap();
        assert_eq!(stored.disposition, FormDisposition::Error);
        assert!(stored.problem.unwrap().contains("c99"));
        assert!(processor.repository().get_case("c2").unwrap().is_none());
    }

    #[test]
    fn creates_are_recorded_in_sync_log() {
        let processor = processor();
        let log = empty_log(&processor);
        processor
            .submit(
                form("f1", 0, json!({"case": {"@case_id": "c1", "create": {"case_type": "t"}}}))
                    .with_last_sync_token(&log.id),
            )
            .unwrap();
        let log = processor.sync_logs().fetch(&log.id).unwrap();
        assert!(log.phone_has_case("c1"));
    }

    #[test]
    fn unknown_sync_token_is_tolerated() {
        let processor = processor();
        processor
            .submit(
                form("f1", 0, json!({"case": {"@case_id": "c1", "create": {}}}))
                    .with_last_sync_token("missing"),
            )
            .unwrap();
        assert!(processor.repository().get_case("c1").unwrap().is_some());
    }

    #[test]
    fn stale_sync_log_is_reconciled() {
        let processor = processor();
        processor
            .submit(form("f1", 0, json!({"case": {"@case_id": "c1", "create": {"case_type": "t"}}})))
            .unwrap();
        let log = empty_log(&processor);

        processor
            .submit(
                form("f2", 1, json!({"case": {"@case_id": "c1", "update": {"visit": "2"}}}))
                    .with_last_sync_token(&log.id),
            )
            .unwrap();

        let case = processor.repository().get_case("c1").unwrap().unwrap();
        assert_eq!(case.properties["visit"], "2");
        assert_eq!(case.xform_ids, vec!["f1", "f2"]);
        assert!(processor.repository().get_form("f2").unwrap().unwrap().initial_processing_complete);
    }

    #[test]
    fn reconciliation_revives_failed_forms() {
        let processor = processor();
        processor
            .submit(form("f1", 0, json!({"case": {"@case_id": "c1", "create": {"case_type": "t"}}})))
            .unwrap();
        processor
            .submit(form("f_err", 1, json!({"case": [
                {"@case_id": "c1", "update": {"visit": "2", "note": "kept"}},
                {"@case_id": "c2", "create": {"case_type": "t"},
                 "index": {"parent": {"@case_type": "t", "#text": "c99"}}}
            ]})))
            .unwrap_err();
        processor
            .submit(form("f3", 2, json!({"case": {"@case_id": "c99", "create": {"case_type": "t"}}})))
            .unwrap();
        let log = empty_log(&processor);

        processor
            .submit(
                form("f4", 3, json!({"case": {"@case_id": "c1", "update": {"visit": "3"}}}))
                    .with_last_sync_token(&log.id),
            )
            .unwrap();

        let revived = processor.repository().get_form("f_err").unwrap().unwrap();
        assert_eq!(revived.disposition, FormDisposition::Submitted);
        assert_eq!(revived.problem, None);

        let c1 = processor.repository().get_case("c1").unwrap().unwrap();
        assert_eq!(c1.properties["visit"], "3");
        assert_eq!(c1.properties["note"], "kept");
        assert_eq!(c1.xform_ids, vec!["f1", "f_err", "f4"]);
        assert!(processor.repository().get_case("c2").unwrap().is_some());
    }

    #[test]
    fn nested_reconciliation_skips_forms_in_flight() {
        let repo = Repository::new(Arc::new(InMemoryStore::new()));
        let feed = Arc::new(CasesReceivedFeed::new());
        let recording = Arc::new(Recording::default());
        feed.subscribe(recording.clone());
        let processor = FormProcessor::new(repo, &ServerConfig::default(), feed);

        processor
            .submit(form("f0", 0, json!({"case": [
                {"@case_id": "x", "create": {"case_type": "t"}},
                {"@case_id": "y", "create": {"case_type": "t"}}
            ]})))
            .unwrap();
        let second_phone = empty_log(&processor);
        let first_phone = empty_log(&processor);
        processor
            .submit(
                form("fb", 1, json!({"case": [
                    {"@case_id": "y", "update": {"b": "1"}},
                    {"@case_id": "x", "update": {"b": "1"}},
                    {"@case_id": "z", "create": {"case_type": "t"},
                     "index": {"parent": {"@case_type": "t", "#text": "c99"}}}
                ]}))
                .with_last_sync_token(&second_phone.id),
            )
            .unwrap_err();
        processor
            .submit(form("f3", 2, json!({"case": {"@case_id": "c99", "create": {"case_type": "t"}}})))
            .unwrap();

        processor
            .submit(
                form("fa", 3, json!({"case": [
                    {"@case_id": "x", "update": {"a": "1"}},
                    {"@case_id": "y", "update": {"a": "1"}}
                ]}))
                .with_last_sync_token(&first_phone.id),
            )
            .unwrap();

        let mut seen = recording.seen.lock().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec!["f0:x", "f0:y", "f3:c99", "fa:x", "fa:y", "fb:x", "fb:y", "fb:z"]
        );

        let fa = processor.repository().get_form("fa").unwrap().unwrap();
        assert!(fa.initial_processing_complete);
        let fb = processor.repository().get_form("fb").unwrap().unwrap();
        assert_eq!(fb.disposition, FormDisposition::Submitted);

        let x = processor.repository().get_case("x").unwrap().unwrap();
        assert_eq!(x.properties["a"], "1");
        assert_eq!(x.properties["b"], "1");
        assert_eq!(x.xform_ids, vec!["f0", "fb", "fa"]);
    }

    struct Failing;

    impl CasesReceivedListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn cases_received(&self, _form: &Form, _cases: &[Case]) -> Result<(), ListenerError> {
            Err(ListenerError::new("boom"))
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl CasesReceivedListener for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn cases_received(&self, form: &Form, cases: &[Case]) -> Result<(), ListenerError> {
            let mut seen = self.seen.lock();
            seen.extend(cases.iter().map(|c| format!("{}:{}", form.id, c.case_id)));
            Ok(())
        }
    }

    #[test]
    fn listener_failures_do_not_fail_submission() {
        let repo = Repository::new(Arc::new(InMemoryStore::new()));
        let feed = Arc::new(CasesReceivedFeed::new());
        let recording = Arc::new(Recording::default());
        feed.subscribe(Arc::new(Failing));
        feed.subscribe(recording.clone());
        let processor = FormProcessor::new(repo, &ServerConfig::default(), feed);

        processor
            .submit(form("f1", 0, json!({"case": {"@case_id": "c1", "create": {}}})))
            .unwrap();
        assert_eq!(*recording.seen.lock(), vec!["f1:c1"]);
        assert!(processor.repository().get_form("f1").unwrap().unwrap().initial_processing_complete);
    }
}
