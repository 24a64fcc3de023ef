//! Computing which cases a restore sends.

use casesync_core::{Case, CaseResult, Repository};
use casesync_sync_protocol::{CaseState, CaseXmlContent, SyncLog};
use std::collections::{HashSet, VecDeque};

/// One case block to emit.
#[derive(Debug, Clone)]
pub struct CaseSyncUpdate {
    /// The case.
    pub case: Case,
    /// Which parts of the block to emit.
    pub content: CaseXmlContent,
}

/// The case side of one restore.
#[derive(Debug, Clone, Default)]
pub struct CaseSyncOperation {
    /// Open cases owned by the user or one of their groups.
    pub owned_cases: Vec<Case>,
    /// Live cases reachable from owned cases through indices and not owned.
    pub extended_cases: Vec<Case>,
    /// Blocks to emit, owned cases first.
    pub cases_to_sync: Vec<CaseSyncUpdate>,
}

impl CaseSyncOperation {
    /// Computes the operation for a set of owner ids, relative to the
    /// client's last sync if it has one.
    ///
    /// Without a last sync every owned and extended case is sent in full.
    /// With one, a case the client does not hold is sent in full, a held
    /// case is sent with only the fields changed since the last sync, and
    /// an owned case closed since the last sync is sent with its close.
    pub fn compute(
        repo: &Repository,
        owner_ids: &[String],
        last_sync: Option<&SyncLog>,
    ) -> CaseResult<Self> {
        let mut owned_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for owner in owner_ids {
            for id in repo.case_ids_by_owner(owner)? {
                if seen.insert(id.clone()) {
                    owned_ids.push(id);
                }
            }
        }

        let (closed, owned): (Vec<Case>, Vec<Case>) = repo
            .get_cases(&owned_ids, false)?
            .into_iter()
            .filter(|case| !case.is_deleted())
            .partition(|case| case.closed);

        let mut visited: HashSet<String> = owned.iter().map(|c| c.case_id.clone()).collect();
        let mut queue: VecDeque<String> = owned
            .iter()
            .flat_map(|c| c.indices.iter().map(|i| i.referenced_id.clone()))
            .collect();
        let mut extended = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            match repo.get_case(&id)? {
                Some(case) if !case.is_deleted() => {
                    queue.extend(case.indices.iter().map(|i| i.referenced_id.clone()));
                    extended.push(case);
                }
                _ => {}
            }
        }

        let mut cases_to_sync = Vec::new();
        for case in owned.iter().chain(&extended) {
            if let Some(content) = content_for(case, last_sync) {
                cases_to_sync.push(CaseSyncUpdate {
                    case: case.clone(),
                    content,
                });
            }
        }
        if let Some(log) = last_sync {
            for case in closed.iter().filter(|c| log.phone_has_case(&c.case_id)) {
                if let Some(content) = content_for(case, last_sync) {
                    cases_to_sync.push(CaseSyncUpdate {
                        case: case.clone(),
                        content,
                    });
                }
            }
        }

        Ok(Self {
            owned_cases: owned,
            extended_cases: extended,
            cases_to_sync,
        })
    }

    /// States of the owned cases, for the new sync log.
    pub fn owned_states(&self) -> Vec<CaseState> {
        self.owned_cases.iter().map(CaseState::from_case).collect()
    }

    /// States of the extended cases, for the new sync log.
    pub fn extended_states(&self) -> Vec<CaseState> {
        self.extended_cases.iter().map(CaseState::from_case).collect()
    }
}

fn content_for(case: &Case, last_sync: Option<&SyncLog>) -> Option<CaseXmlContent> {
    match last_sync {
        Some(log) if log.phone_has_case(&case.case_id) => (case.seq > log.last_seq)
            .then(|| CaseXmlContent::changed(case, case.fields_changed_since(log.last_seq))),
        _ => Some(CaseXmlContent::full(case)),
    }
}
