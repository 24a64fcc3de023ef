//! What a client holds for one case.

use casesync_core::{Case, CaseIndex};
use serde::{Deserialize, Serialize};

/// A case id plus the indices the client knows for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseState {
    /// The case id.
    pub case_id: String,
    /// The case's indices as last sent to or submitted by the client.
    pub indices: Vec<CaseIndex>,
}

impl CaseState {
    /// Creates a state with no indices.
    pub fn new(case_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            indices: Vec::new(),
        }
    }

    /// Captures a case's current indices.
    pub fn from_case(case: &Case) -> Self {
        Self {
            case_id: case.case_id.clone(),
            indices: case.indices.clone(),
        }
    }

    /// Applies submitted index changes; an empty referenced id removes.
    pub fn update_indices(&mut self, changes: &[CaseIndex]) {
        for change in changes {
            self.indices.retain(|i| i.identifier != change.identifier);
            if !change.referenced_id.is_empty() {
                self.indices.push(change.clone());
            }
        }
    }

    /// Returns true if any index points at `case_id`.
    #[must_use]
    pub fn references(&self, case_id: &str) -> bool {
        self.indices.iter().any(|i| i.referenced_id == case_id)
    }
}
