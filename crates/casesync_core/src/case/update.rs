//! Parsing of submitted case blocks.

use super::action::{ActionPayload, AttachmentChange, CaseAction, ReferralChange};
use super::model::CaseIndex;
use crate::consts::{
    CASE_ACTION_ATTACHMENT, CASE_ACTION_CLOSE, CASE_ACTION_CREATE, CASE_ACTION_INDEX,
    CASE_ACTION_REFERRAL, CASE_ACTION_UPDATE, CASE_ATTR_DATE_MODIFIED, CASE_ATTR_ID,
    CASE_ATTR_USER_ID, CASE_TAG_DATE_MODIFIED, CASE_TAG_ID, TEXT_KEY,
};
use crate::error::{CaseError, CaseResult};
use crate::form::Form;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One parsed case block.
///
/// Both block shapes are accepted: the id as a `case_id` child element, or
/// as a `@case_id` attribute with `@date_modified` / `@user_id` beside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseUpdate {
    /// The case id.
    pub id: String,
    /// Client-side modification date.
    pub date_modified: Option<DateTime<Utc>>,
    /// Submitting user, when the block names one.
    pub user_id: Option<String>,
    /// Create fields.
    pub create: Option<BTreeMap<String, String>>,
    /// Update fields.
    pub update: Option<BTreeMap<String, String>>,
    /// Close flag.
    pub close: bool,
    /// Index changes.
    pub index: Option<Vec<CaseIndex>>,
    /// Attachment changes.
    pub attachment: Option<Vec<AttachmentChange>>,
    /// Referral change.
    pub referral: Option<ReferralChange>,
}

impl CaseUpdate {
    /// Creates an empty update for a case id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parses a case block.
    ///
    /// # Errors
    ///
    /// Returns [`CaseError::MalformedCaseBlock`] when the block is not a map
    /// or has no usable case id.
    pub fn from_block(block: &Value) -> CaseResult<Self> {
        let map = block
            .as_object()
            .ok_or_else(|| CaseError::malformed_block("case block is not a map"))?;

        let id = first_text(map, &[CASE_ATTR_ID, CASE_TAG_ID])
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CaseError::malformed_block("case block has no case id"))?;

        let referral = match map.get(CASE_ACTION_REFERRAL) {
            Some(value) => Some(parse_referral(value)?),
            None => None,
        };

        Ok(Self {
            id,
            date_modified: first_text(map, &[CASE_ATTR_DATE_MODIFIED, CASE_TAG_DATE_MODIFIED])
                .as_deref()
                .and_then(parse_datetime),
            user_id: first_text(map, &[CASE_ATTR_USER_ID]).filter(|u| !u.is_empty()),
            create: map.get(CASE_ACTION_CREATE).map(parse_fields),
            update: map.get(CASE_ACTION_UPDATE).map(parse_fields),
            close: map.contains_key(CASE_ACTION_CLOSE),
            index: map.get(CASE_ACTION_INDEX).map(parse_indices),
            attachment: map.get(CASE_ACTION_ATTACHMENT).map(parse_attachments),
            referral,
        })
    }

    /// Returns true if the block creates the case.
    #[must_use]
    pub fn creates_case(&self) -> bool {
        self.create.is_some()
    }

    /// Returns true if the block changes indices.
    #[must_use]
    pub fn has_index_changes(&self) -> bool {
        self.index.as_ref().is_some_and(|i| !i.is_empty())
    }

    /// Builds the log entries for this block, in application order:
    /// create, update, close, index, attachment, referral.
    pub fn to_actions(&self, form: &Form, applied_seq: u64) -> Vec<CaseAction> {
        let mut payloads = Vec::new();
        if let Some(fields) = &self.create {
            payloads.push(ActionPayload::Create {
                fields: fields.clone(),
            });
        }
        if let Some(fields) = &self.update {
            payloads.push(ActionPayload::Update {
                fields: fields.clone(),
            });
        }
        if self.close {
            payloads.push(ActionPayload::Close);
        }
        if let Some(indices) = &self.index {
            payloads.push(ActionPayload::Index {
                indices: indices.clone(),
            });
        }
        if let Some(changes) = &self.attachment {
            payloads.push(ActionPayload::Attachment {
                changes: changes.clone(),
            });
        }
        if let Some(change) = &self.referral {
            payloads.push(ActionPayload::Referral {
                change: change.clone(),
            });
        }

        let user_id = self
            .user_id
            .clone()
            .or_else(|| form.user_id.clone())
            .unwrap_or_default();
        payloads
            .into_iter()
            .map(|payload| CaseAction {
                payload,
                date: self.date_modified.unwrap_or(form.received_on),
                server_date: form.received_on,
                xform_id: form.id.clone(),
                user_id: user_id.clone(),
                applied_seq,
            })
            .collect()
    }
}

/// Returns the text content of a parsed node.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => map.get(TEXT_KEY).map(text).unwrap_or_default(),
        Value::Null | Value::Array(_) => String::new(),
    }
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| map.get(*k)).map(text)
}

fn is_attribute(key: &str) -> bool {
    key.starts_with('@') || key == TEXT_KEY
}

fn parse_fields(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(k, _)| !is_attribute(k))
                .map(|(k, v)| (k.clone(), text(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_indices(value: &Value) -> Vec<CaseIndex> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(k, _)| !is_attribute(k))
        .map(|(identifier, v)| CaseIndex {
            identifier: identifier.clone(),
            referenced_type: v.get("@case_type").map(text).unwrap_or_default(),
            referenced_id: text(v),
        })
        .collect()
}

fn parse_attachments(value: &Value) -> Vec<AttachmentChange> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(k, _)| !is_attribute(k))
        .map(|(identifier, v)| AttachmentChange {
            identifier: identifier.clone(),
            src: v.get("@src").map(text).filter(|s| !s.is_empty()),
            from: v.get("@from").map(text).filter(|s| !s.is_empty()),
        })
        .collect()
}

fn parse_referral(value: &Value) -> CaseResult<ReferralChange> {
    let referral_id = value
        .get("referral_id")
        .map(text)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CaseError::malformed_block("referral block has no referral_id"))?;
    let open_types = value
        .get("open")
        .and_then(|open| open.get("referral_types"))
        .map(text)
        .map(|types| types.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let update = value.get("update");
    Ok(ReferralChange {
        referral_id,
        followup_on: value
            .get("followup_date")
            .map(text)
            .as_deref()
            .and_then(parse_date),
        open_types,
        update_type: update
            .and_then(|u| u.get("referral_type"))
            .map(text)
            .filter(|t| !t.is_empty()),
        closed_on: update
            .and_then(|u| u.get("date_closed"))
            .map(text)
            .as_deref()
            .and_then(parse_date),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parses RFC 3339, a naive ISO timestamp (taken as UTC), or a bare date.
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    parse_date(s)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_attribute_style_block() {
        let update = CaseUpdate::from_block(&json!({
            "@case_id": "c1",
            "@date_modified": "2024-03-01T10:00:00Z",
            "@user_id": "u1",
            "create": {"case_type": "person", "case_name": "Ann", "owner_id": "o1"},
            "update": {"age": 31},
            "close": ""
        }))
        .unwrap();
        assert_eq!(update.id, "c1");
        assert_eq!(update.user_id.as_deref(), Some("u1"));
        assert_eq!(
            update.date_modified,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(update.create.as_ref().unwrap()["case_name"], "Ann");
        assert_eq!(update.update.as_ref().unwrap()["age"], "31");
        assert!(update.close);
    }

    #[test]
    fn parses_element_style_block() {
        let update = CaseUpdate::from_block(&json!({
            "case_id": "asdf",
            "date_modified": "2010-06-29",
            "create": {"case_type_id": "test_case_type", "user_id": "foo", "case_name": "test case name"},
            "update": {"external_id": "someexternal"}
        }))
        .unwrap();
        assert_eq!(update.id, "asdf");
        assert!(update.creates_case());
        assert_eq!(update.create.as_ref().unwrap()["case_type_id"], "test_case_type");
        assert!(update.date_modified.is_some());
        assert!(!update.close);
    }

    #[test]
    fn rejects_block_without_id() {
        let err = CaseUpdate::from_block(&json!({"@case_id": "  ", "update": {}})).unwrap_err();
        assert!(matches!(err, CaseError::MalformedCaseBlock { .. }));
        assert!(CaseUpdate::from_block(&json!("c1")).is_err());
    }

    #[test]
    fn index_shapes() {
        let update = CaseUpdate::from_block(&json!({
            "@case_id": "c2",
            "index": {
                "parent": {"@case_type": "household", "#text": "c1"},
                "plain": "c3",
                "gone": {"@case_type": "x"}
            }
        }))
        .unwrap();
        let indices = update.index.unwrap();
        let find = |name: &str| indices.iter().find(|i| i.identifier == name).unwrap();
        assert_eq!(find("parent").referenced_type, "household");
        assert_eq!(find("parent").referenced_id, "c1");
        assert_eq!(find("plain").referenced_id, "c3");
        assert_eq!(find("gone").referenced_id, "");
    }

    #[test]
    fn referral_requires_id() {
        let result = CaseUpdate::from_block(&json!({
            "@case_id": "c1",
            "referral": {"open": {"referral_types": "a"}}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn actions_follow_fixed_order() {
        let form = Form::new("f1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), json!({}));
        let update = CaseUpdate::from_block(&json!({
            "@case_id": "c1",
            "attachment": {"a": {"@src": "a.jpg"}},
            "close": {},
            "index": {"p": "c0"},
            "update": {"x": "1"},
            "create": {"case_type": "t"}
        }))
        .unwrap();
        let kinds: Vec<_> = update
            .to_actions(&form, 0)
            .iter()
            .map(|a| a.action_type().as_str())
            .collect();
        assert_eq!(kinds, vec!["create", "update", "close", "index", "attachment"]);
    }

    #[test]
    fn action_date_falls_back_to_received_on() {
        let received = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let form = Form::new("f1", received, json!({})).with_user_id("u9");
        let update = CaseUpdate::from_block(&json!({"@case_id": "c1", "close": {}})).unwrap();
        let actions = update.to_actions(&form, 3);
        assert_eq!(actions[0].date, received);
        assert_eq!(actions[0].user_id, "u9");
        assert_eq!(actions[0].xform_id, "f1");
    }

    #[test]
    fn datetime_formats() {
        assert!(parse_datetime("2024-01-01T10:00:00.123").is_some());
        assert!(parse_datetime("2024-01-01T10:00:00+02:00").is_some());
        assert!(parse_datetime("2024-01-01").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
