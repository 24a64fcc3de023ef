//! The per-client replication cursor.

use crate::case_state::CaseState;
use crate::error::{SyncLogError, SyncLogResult};
use crate::hash::CaseStateHash;
use crate::version::ProtocolVersion;
use casesync_core::{ActionPayload, Case, CaseAction, CaseActionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::warn;
use uuid::Uuid;

/// What one client received at one restore, chained to its predecessor.
///
/// A sync log is immutable once created, except for its cached payloads
/// and the phone-list bookkeeping done while processing forms submitted
/// against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    /// Opaque id handed to the client as its sync token.
    pub id: String,
    /// The user that restored.
    pub user_id: String,
    /// When the log was created.
    pub date: DateTime<Utc>,
    /// Storage change sequence observed before the log was written.
    pub last_seq: u64,
    /// The log this one follows.
    pub previous_log_id: Option<String>,
    /// Owner ids whose cases the client holds.
    pub owner_ids_on_phone: Vec<String>,
    /// Cases the client owns.
    pub cases_on_phone: Vec<CaseState>,
    /// Cases the client holds only because owned cases index them.
    pub dependent_cases_on_phone: Vec<CaseState>,
    /// Cached restore payloads keyed by protocol version.
    #[serde(default)]
    pub cached_payloads: BTreeMap<String, String>,
    /// Storage revision, `None` if never saved.
    #[serde(skip)]
    pub rev: Option<u64>,
}

impl SyncLog {
    /// Creates a log with a fresh id.
    pub fn new(user_id: impl Into<String>, last_seq: u64) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            user_id: user_id.into(),
            date: Utc::now(),
            last_seq,
            previous_log_id: None,
            owner_ids_on_phone: Vec::new(),
            cases_on_phone: Vec::new(),
            dependent_cases_on_phone: Vec::new(),
            cached_payloads: BTreeMap::new(),
            rev: None,
        }
    }

    /// Chains the log to its predecessor.
    #[must_use]
    pub fn with_previous_log_id(mut self, id: Option<String>) -> Self {
        self.previous_log_id = id;
        self
    }

    /// Sets the owner ids.
    #[must_use]
    pub fn with_owner_ids(mut self, owner_ids: Vec<String>) -> Self {
        self.owner_ids_on_phone = owner_ids;
        self
    }

    /// Sets the owned cases.
    #[must_use]
    pub fn with_cases_on_phone(mut self, cases: Vec<CaseState>) -> Self {
        self.cases_on_phone = cases;
        self
    }

    /// Sets the dependent cases.
    #[must_use]
    pub fn with_dependent_cases(mut self, cases: Vec<CaseState>) -> Self {
        self.dependent_cases_on_phone = cases;
        self
    }

    /// Returns true if the client holds the case, owned or dependent.
    #[must_use]
    pub fn phone_has_case(&self, case_id: &str) -> bool {
        self.get_case_state(case_id).is_some()
    }

    /// Returns true if the client holds the case only as a dependent.
    #[must_use]
    pub fn phone_has_dependent_case(&self, case_id: &str) -> bool {
        self.dependent_cases_on_phone
            .iter()
            .any(|s| s.case_id == case_id)
    }

    /// Returns the state of a case the client holds.
    #[must_use]
    pub fn get_case_state(&self, case_id: &str) -> Option<&CaseState> {
        self.cases_on_phone
            .iter()
            .chain(&self.dependent_cases_on_phone)
            .find(|s| s.case_id == case_id)
    }

    fn get_case_state_mut(&mut self, case_id: &str) -> Option<&mut CaseState> {
        self.cases_on_phone
            .iter_mut()
            .chain(self.dependent_cases_on_phone.iter_mut())
            .find(|s| s.case_id == case_id)
    }

    /// Returns the case ids the client should hold: owned cases plus
    /// everything reachable from them through indices. Index targets the
    /// log does not track are not part of it.
    #[must_use]
    pub fn footprint(&self) -> BTreeSet<String> {
        let states: HashMap<&str, &CaseState> = self
            .cases_on_phone
            .iter()
            .chain(&self.dependent_cases_on_phone)
            .map(|s| (s.case_id.as_str(), s))
            .collect();
        let mut footprint = BTreeSet::new();
        let mut queue: VecDeque<&str> = self
            .cases_on_phone
            .iter()
            .map(|s| s.case_id.as_str())
            .collect();
        while let Some(case_id) = queue.pop_front() {
            let Some(state) = states.get(case_id) else {
                continue;
            };
            if footprint.insert(case_id.to_string()) {
                queue.extend(state.indices.iter().map(|i| i.referenced_id.as_str()));
            }
        }
        footprint
    }

    /// Returns the hash of the footprint.
    #[must_use]
    pub fn get_state_hash(&self) -> CaseStateHash {
        CaseStateHash::compute(self.footprint())
    }

    /// Returns the payload cached for a protocol version.
    #[must_use]
    pub fn get_cached_payload(&self, version: ProtocolVersion) -> Option<&str> {
        self.cached_payloads
            .get(version.as_str())
            .map(String::as_str)
    }

    /// Caches a payload for a protocol version.
    pub fn set_cached_payload(&mut self, version: ProtocolVersion, payload: impl Into<String>) {
        self.cached_payloads
            .insert(version.as_str().to_string(), payload.into());
    }

    /// Drops dependent cases no longer reachable from owned cases.
    ///
    /// Returns true if anything was removed.
    pub fn prune_dependent_cases(&mut self) -> bool {
        let footprint = self.footprint();
        let before = self.dependent_cases_on_phone.len();
        self.dependent_cases_on_phone
            .retain(|s| footprint.contains(&s.case_id));
        before != self.dependent_cases_on_phone.len()
    }

    /// Updates what the client holds after it submitted `form_id`, which
    /// touched `cases`.
    ///
    /// Creates are applied first, so a form may create a case and index it
    /// in either block order. Then, per case action:
    /// - update: the client must hold the case
    /// - index: the client must hold the case and every new target
    /// - close: the client must hold the case; it is dropped, or kept as a
    ///   dependent while another held case indexes it
    ///
    /// A create for a case the client already owns is accepted as a repeat.
    /// With `strict` unset, failed checks are logged instead of raised.
    ///
    /// Returns true if the log changed.
    ///
    /// # Errors
    ///
    /// [`SyncLogError::Assertion`] naming the first case that failed a check.
    pub fn update_phone_lists(
        &mut self,
        form_id: &str,
        cases: &[Case],
        strict: bool,
    ) -> SyncLogResult<bool> {
        let form_actions = |case: &Case| -> Vec<CaseAction> {
            case.actions
                .iter()
                .filter(|a| a.xform_id == form_id)
                .cloned()
                .collect()
        };
        let mut changed = false;

        for case in cases {
            let creates = form_actions(case)
                .iter()
                .any(|a| a.action_type() == CaseActionType::Create);
            if creates {
                changed |= self.record_create(case);
            }
        }

        for case in cases {
            for action in form_actions(case) {
                match &action.payload {
                    ActionPayload::Update { .. } => {
                        self.check(&case.case_id, "case being updated is not on the phone", strict)?;
                    }
                    ActionPayload::Index { indices } => {
                        self.check(&case.case_id, "case being indexed is not on the phone", strict)?;
                        for index in indices.iter().filter(|i| !i.referenced_id.is_empty()) {
                            self.check(
                                &index.referenced_id,
                                &format!("index target of {} is not on the phone", case.case_id),
                                strict,
                            )?;
                        }
                        if let Some(state) = self.get_case_state_mut(&case.case_id) {
                            state.update_indices(indices);
                            changed = true;
                        }
                    }
                    ActionPayload::Close => {
                        self.check(&case.case_id, "case being closed is not on the phone", strict)?;
                        changed |= self.archive_case(&case.case_id);
                    }
                    ActionPayload::Create { .. }
                    | ActionPayload::Attachment { .. }
                    | ActionPayload::Referral { .. } => {}
                }
            }
        }
        Ok(changed)
    }

    fn check(&self, case_id: &str, message: &str, strict: bool) -> SyncLogResult<()> {
        if self.phone_has_case(case_id) {
            return Ok(());
        }
        if strict {
            return Err(SyncLogError::assertion(case_id, message));
        }
        warn!(sync_log_id = %self.id, case_id, message, "ignoring sync log assertion");
        Ok(())
    }

    fn record_create(&mut self, case: &Case) -> bool {
        if self.cases_on_phone.iter().any(|s| s.case_id == case.case_id) {
            return false;
        }
        self.dependent_cases_on_phone
            .retain(|s| s.case_id != case.case_id);
        self.cases_on_phone.push(CaseState::new(&case.case_id));
        true
    }

    fn archive_case(&mut self, case_id: &str) -> bool {
        let Some(pos) = self.cases_on_phone.iter().position(|s| s.case_id == case_id) else {
            return false;
        };
        let state = self.cases_on_phone.remove(pos);
        let still_referenced = self
            .cases_on_phone
            .iter()
            .chain(&self.dependent_cases_on_phone)
            .any(|s| s.references(case_id));
        if still_referenced && !self.phone_has_dependent_case(case_id) {
            self.dependent_cases_on_phone.push(state);
        }
        true
    }
}
