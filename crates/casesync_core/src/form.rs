//! Submitted forms and case block extraction.

use crate::case::CaseUpdate;
use crate::consts::{CASE_ATTR_ID, CASE_TAG, CASE_TAG_ID, DEVICE_REPORT_XMLNS, XMLNS_ATTR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// Processing state of a stored form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormDisposition {
    /// Accepted; its case effects are part of history.
    #[default]
    Submitted,
    /// Processing failed; excluded from history until reprocessed.
    Error,
    /// Rejected outright.
    Invalid,
}

impl FormDisposition {
    const SUBMITTED: &'static str = "XFormInstance";
    const ERROR: &'static str = "XFormError";
    const INVALID: &'static str = "XFormInvalid";

    /// Returns the storage tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => Self::SUBMITTED,
            Self::Error => Self::ERROR,
            Self::Invalid => Self::INVALID,
        }
    }

    /// Parses a storage tag. Returns `None` for non-form documents.
    #[must_use]
    pub fn from_doc_type(doc_type: &str) -> Option<Self> {
        match doc_type {
            Self::SUBMITTED => Some(Self::Submitted),
            Self::ERROR => Some(Self::Error),
            Self::INVALID => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// A submitted form: an already-parsed nested document plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Stable id.
    pub id: String,
    /// Owning domain.
    pub domain: Option<String>,
    /// Submitting user.
    pub user_id: Option<String>,
    /// When the server received the form.
    pub received_on: DateTime<Utc>,
    /// Processing state.
    #[serde(default)]
    pub disposition: FormDisposition,
    /// Sync log id the device held when it submitted.
    pub last_sync_token: Option<String>,
    /// Set once case effects are persisted.
    #[serde(default)]
    pub initial_processing_complete: bool,
    /// Why processing failed.
    pub problem: Option<String>,
    /// The parsed form body.
    pub body: Value,
    /// Storage revision, `None` if never saved.
    #[serde(skip)]
    pub rev: Option<u64>,
}

impl Form {
    /// Creates a submitted form.
    pub fn new(id: impl Into<String>, received_on: DateTime<Utc>, body: Value) -> Self {
        Self {
            id: id.into(),
            domain: None,
            user_id: None,
            received_on,
            disposition: FormDisposition::Submitted,
            last_sync_token: None,
            initial_processing_complete: false,
            problem: None,
            body,
            rev: None,
        }
    }

    /// Sets the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the submitting user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the sync token the device held.
    #[must_use]
    pub fn with_last_sync_token(mut self, token: impl Into<String>) -> Self {
        self.last_sync_token = Some(token.into());
        self
    }

    /// Returns true if the form's effects count as history.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.disposition == FormDisposition::Submitted
    }

    /// Marks the form as failed.
    pub fn mark_error(&mut self, problem: impl Into<String>) {
        self.disposition = FormDisposition::Error;
        self.problem = Some(problem.into());
    }

    /// Parses every case block in the body.
    ///
    /// Blocks that cannot be parsed are logged and skipped.
    pub fn case_updates(&self) -> Vec<CaseUpdate> {
        extract_case_blocks(&self.body)
            .into_iter()
            .filter_map(|block| match CaseUpdate::from_block(block) {
                Ok(update) => Some(update),
                Err(e) => {
                    error!(form_id = %self.id, error = %e, "skipping case block");
                    None
                }
            })
            .collect()
    }

    /// Returns the distinct case ids the form touches, in block order.
    pub fn case_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for update in self.case_updates() {
            if !ids.contains(&update.id) {
                ids.push(update.id);
            }
        }
        ids
    }
}

/// Extracts the case blocks of a form body.
///
/// Lists and maps are walked recursively. A map whose `@xmlns` is the
/// device-report namespace is skipped entirely. A `case` key holds one block
/// or a list of blocks, and the walk does not descend into them. Only blocks
/// carrying a case id are returned.
pub fn extract_case_blocks(body: &Value) -> Vec<&Value> {
    let mut blocks = Vec::new();
    collect_case_blocks(body, &mut blocks);
    blocks
}

fn collect_case_blocks<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    match node {
        Value::Array(items) => {
            for item in items {
                collect_case_blocks(item, out);
            }
        }
        Value::Object(map) => {
            if map.get(XMLNS_ATTR).and_then(Value::as_str) == Some(DEVICE_REPORT_XMLNS) {
                return;
            }
            for (key, value) in map {
                if key != CASE_TAG {
                    collect_case_blocks(value, out);
                    continue;
                }
                match value {
                    Value::Array(blocks) => {
                        out.extend(blocks.iter().filter(|b| has_case_id(b)));
                    }
                    block if has_case_id(block) => out.push(block),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn has_case_id(block: &Value) -> bool {
    block.get(CASE_TAG_ID).is_some() || block.get(CASE_ATTR_ID).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn extracts_nested_blocks() {
        let body = json!({
            "meta": {"userID": "u1"},
            "case": {"@case_id": "top"},
            "group": [
                {"case": [{"case_id": "a"}, {"case_id": "b"}, {"no_id": true}]},
                {"inner": {"case": {"@case_id": "c", "case": {"@case_id": "hidden"}}}}
            ]
        });
        let ids: Vec<_> = extract_case_blocks(&body)
            .iter()
            .map(|b| CaseUpdate::from_block(b).unwrap().id)
            .collect();
        assert_eq!(ids.len(), 4);
        for id in ["top", "a", "b", "c"] {
            assert!(ids.iter().any(|i| i == id));
        }
        assert!(!ids.iter().any(|i| i == "hidden"));
    }

    #[test]
    fn skips_device_reports() {
        let body = json!({
            "report": {
                "@xmlns": DEVICE_REPORT_XMLNS,
                "case": {"@case_id": "ignored"}
            },
            "case": {"@case_id": "kept"}
        });
        let blocks = extract_case_blocks(&body);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["@case_id"], "kept");
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let form = Form::new(
            "f1",
            received(),
            json!({"case": [{"@case_id": ""}, {"@case_id": "c1"}, {"@case_id": "c1"}]}),
        );
        assert_eq!(form.case_updates().len(), 2);
        assert_eq!(form.case_ids(), vec!["c1"]);
    }

    #[test]
    fn disposition_tags() {
        for disposition in [
            FormDisposition::Submitted,
            FormDisposition::Error,
            FormDisposition::Invalid,
        ] {
            assert_eq!(FormDisposition::from_doc_type(disposition.as_str()), Some(disposition));
        }
        assert_eq!(FormDisposition::from_doc_type("CommCareCase"), None);
    }

    #[test]
    fn mark_error_records_problem() {
        let mut form = Form::new("f1", received(), json!({}));
        assert!(form.is_submitted());
        form.mark_error("bad index");
        assert_eq!(form.disposition, FormDisposition::Error);
        assert_eq!(form.problem.as_deref(), Some("bad index"));
    }
}
