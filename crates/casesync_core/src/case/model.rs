//! Case model.

use super::action::{ActionPayload, AttachmentChange, CaseAction, ReferralChange};
use super::update::CaseUpdate;
use crate::form::Form;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Storage type tag of a case document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseDocType {
    /// A live case.
    #[default]
    Case,
    /// A tombstoned case.
    Deleted,
}

impl CaseDocType {
    const CASE: &'static str = "CommCareCase";
    const DELETED: &'static str = "CommCareCase-Deleted";

    /// Returns the storage tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Case => Self::CASE,
            Self::Deleted => Self::DELETED,
        }
    }

    /// Parses a storage tag. Returns `None` for non-case documents.
    #[must_use]
    pub fn from_doc_type(doc_type: &str) -> Option<Self> {
        match doc_type {
            Self::CASE => Some(Self::Case),
            Self::DELETED => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A named reference from one case to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseIndex {
    /// Index name, unique per case.
    pub identifier: String,
    /// Type of the referenced case.
    pub referenced_type: String,
    /// Id of the referenced case.
    pub referenced_id: String,
}

impl CaseIndex {
    /// Creates an index.
    pub fn new(
        identifier: impl Into<String>,
        referenced_type: impl Into<String>,
        referenced_id: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            referenced_type: referenced_type.into(),
            referenced_id: referenced_id.into(),
        }
    }
}

/// An attachment on a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAttachment {
    /// Attachment name.
    pub identifier: String,
    /// Source reference.
    pub attachment_src: String,
    /// Origin of the attachment.
    pub attachment_from: Option<String>,
    /// The form that attached it.
    pub xform_id: String,
}

/// A referral on a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    /// Referral id.
    pub referral_id: String,
    /// Referral type.
    pub referral_type: String,
    /// When the referral was opened.
    pub opened_on: DateTime<Utc>,
    /// Last change.
    pub modified_on: DateTime<Utc>,
    /// Follow-up date.
    pub followup_on: Option<NaiveDate>,
    /// Closed flag.
    pub closed: bool,
    /// Closing date.
    pub closed_on: Option<NaiveDate>,
}

/// A case: a long-lived record derived from the forms that touched it.
///
/// The `actions` log is authoritative. Every other field can be recomputed
/// by replaying the log (see [`Case::reconcile_actions`]) or by rebuilding
/// from the forms that reference the case (see [`crate::rebuild_case`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Case {
    /// Client-generated, globally unique id.
    pub case_id: String,
    /// Owning domain.
    pub domain: Option<String>,
    /// Case type.
    pub case_type: String,
    /// Display name.
    pub name: String,
    /// Owner (user or group); empty means the creating user.
    pub owner_id: String,
    /// Creating user.
    pub user_id: String,
    /// External id.
    pub external_id: String,
    /// When the case was opened.
    pub opened_on: Option<DateTime<Utc>>,
    /// Last modification.
    pub modified_on: Option<DateTime<Utc>>,
    /// Closed flag.
    pub closed: bool,
    /// When the case was closed.
    pub closed_on: Option<DateTime<Utc>>,
    /// Who closed the case.
    pub closed_by: String,
    /// Dynamic properties.
    pub properties: BTreeMap<String, String>,
    /// Event log.
    pub actions: Vec<CaseAction>,
    /// Indices, in submission order.
    pub indices: Vec<CaseIndex>,
    /// Attachments, in attach order.
    pub attachments: Vec<CaseAttachment>,
    /// Referrals.
    pub referrals: Vec<Referral>,
    /// Forms that touched the case, in processing order.
    pub xform_ids: Vec<String>,
    /// Live or tombstoned.
    pub doc_type: CaseDocType,
    /// Storage revision, `None` if never saved.
    #[serde(skip)]
    pub rev: Option<u64>,
    /// Storage change sequence of the last save.
    #[serde(skip)]
    pub seq: u64,
}

impl Case {
    /// Creates an empty case.
    pub fn new(case_id: impl Into<String>, domain: Option<String>) -> Self {
        Self {
            case_id: case_id.into(),
            domain,
            ..Self::default()
        }
    }

    /// Creates a case from the first block that mentions it.
    pub fn from_case_update(update: &CaseUpdate, form: &Form, applied_seq: u64) -> Self {
        let mut case = Self::new(update.id.clone(), form.domain.clone());
        case.update_from_case_update(update, form, applied_seq);
        case
    }

    /// Applies one case block: appends its actions to the log, applies them
    /// and records the form.
    pub fn update_from_case_update(&mut self, update: &CaseUpdate, form: &Form, applied_seq: u64) {
        for action in update.to_actions(form, applied_seq) {
            self.apply_action(&action);
            self.actions.push(action);
        }
        self.touch_form(&form.id);
    }

    /// Records that a form touched the case.
    pub fn touch_form(&mut self, form_id: &str) {
        if !self.xform_ids.iter().any(|id| id == form_id) {
            self.xform_ids.push(form_id.to_string());
        }
    }

    /// Returns true if the form already touched the case.
    #[must_use]
    pub fn has_form(&self, form_id: &str) -> bool {
        self.xform_ids.iter().any(|id| id == form_id)
    }

    /// Returns true if the case is tombstoned.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.doc_type == CaseDocType::Deleted
    }

    /// Returns the owner id, falling back to the creating user.
    #[must_use]
    pub fn effective_owner(&self) -> &str {
        if self.owner_id.is_empty() {
            &self.user_id
        } else {
            &self.owner_id
        }
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn get_index(&self, identifier: &str) -> Option<&CaseIndex> {
        self.indices.iter().find(|i| i.identifier == identifier)
    }

    /// Returns the value of a base field or dynamic property.
    #[must_use]
    pub fn field_value(&self, key: &str) -> Option<&str> {
        match key {
            "case_type" | "case_type_id" => Some(&self.case_type),
            "case_name" => Some(&self.name),
            "owner_id" => Some(&self.owner_id),
            "external_id" => Some(&self.external_id),
            "user_id" => Some(&self.user_id),
            _ => self.properties.get(key).map(String::as_str),
        }
    }

    /// Returns the names of fields written by actions applied after `seq`.
    #[must_use]
    pub fn fields_changed_since(&self, seq: u64) -> BTreeSet<String> {
        self.actions
            .iter()
            .filter(|a| a.applied_seq > seq)
            .filter_map(CaseAction::fields)
            .flat_map(|fields| fields.keys().cloned())
            .collect()
    }

    /// Clears all derived state. Identity, domain and storage metadata stay.
    pub fn reset(&mut self) {
        *self = Self {
            case_id: std::mem::take(&mut self.case_id),
            domain: self.domain.take(),
            rev: self.rev,
            seq: self.seq,
            ..Self::default()
        };
    }

    /// Re-derives the case from its own log, sorted by action date.
    ///
    /// Actions with equal dates keep their log order.
    pub fn reconcile_actions(&mut self) {
        let mut actions = std::mem::take(&mut self.actions);
        let xform_ids = std::mem::take(&mut self.xform_ids);
        let doc_type = self.doc_type;
        actions.sort_by_key(|a| a.date);
        self.reset();
        for action in &actions {
            self.apply_action(action);
        }
        self.actions = actions;
        self.xform_ids = xform_ids;
        self.doc_type = doc_type;
    }

    pub(crate) fn apply_action(&mut self, action: &CaseAction) {
        match &action.payload {
            ActionPayload::Create { fields } => {
                if self.user_id.is_empty() {
                    self.user_id = action.user_id.clone();
                }
                self.opened_on = Some(action.date);
                self.set_fields(fields);
            }
            ActionPayload::Update { fields } => self.set_fields(fields),
            ActionPayload::Close => {
                self.closed = true;
                self.closed_on = Some(action.date);
                self.closed_by = action.user_id.clone();
            }
            ActionPayload::Index { indices } => {
                for index in indices {
                    self.apply_index(index);
                }
            }
            ActionPayload::Attachment { changes } => {
                for change in changes {
                    self.apply_attachment(change, &action.xform_id);
                }
            }
            ActionPayload::Referral { change } => self.apply_referral(change, action.date),
        }
        self.modified_on = Some(action.date);
    }

    fn set_fields(&mut self, fields: &BTreeMap<String, String>) {
        for (key, value) in fields {
            let value = value.clone();
            match key.as_str() {
                "case_type" | "case_type_id" => self.case_type = value,
                "case_name" => self.name = value,
                "owner_id" => self.owner_id = value,
                "external_id" => self.external_id = value,
                "user_id" => self.user_id = value,
                _ => {
                    self.properties.insert(key.clone(), value);
                }
            }
        }
    }

    fn apply_index(&mut self, index: &CaseIndex) {
        if index.referenced_id.is_empty() {
            self.indices.retain(|i| i.identifier != index.identifier);
        } else if let Some(existing) = self
            .indices
            .iter_mut()
            .find(|i| i.identifier == index.identifier)
        {
            *existing = index.clone();
        } else {
            self.indices.push(index.clone());
        }
    }

    fn apply_attachment(&mut self, change: &AttachmentChange, xform_id: &str) {
        self.attachments
            .retain(|a| a.identifier != change.identifier);
        if let Some(src) = &change.src {
            self.attachments.push(CaseAttachment {
                identifier: change.identifier.clone(),
                attachment_src: src.clone(),
                attachment_from: change.from.clone(),
                xform_id: xform_id.to_string(),
            });
        }
    }

    fn apply_referral(&mut self, change: &ReferralChange, date: DateTime<Utc>) {
        for referral_type in &change.open_types {
            self.referrals.push(Referral {
                referral_id: change.referral_id.clone(),
                referral_type: referral_type.clone(),
                opened_on: date,
                modified_on: date,
                followup_on: change.followup_on,
                closed: false,
                closed_on: None,
            });
        }
        if let Some(update_type) = &change.update_type {
            let target = self.referrals.iter_mut().find(|r| {
                r.referral_id == change.referral_id && &r.referral_type == update_type
            });
            if let Some(referral) = target {
                if change.closed_on.is_some() {
                    referral.closed = true;
                    referral.closed_on = change.closed_on;
                } else if change.followup_on.is_some() {
                    referral.followup_on = change.followup_on;
                }
                referral.modified_on = date;
            }
        }
    }
}

/// The lite projection of a case: everything except the action log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaseLite {
    case_id: String,
    domain: Option<String>,
    case_type: String,
    name: String,
    owner_id: String,
    user_id: String,
    external_id: String,
    opened_on: Option<DateTime<Utc>>,
    modified_on: Option<DateTime<Utc>>,
    closed: bool,
    closed_on: Option<DateTime<Utc>>,
    closed_by: String,
    properties: BTreeMap<String, String>,
    indices: Vec<CaseIndex>,
    attachments: Vec<CaseAttachment>,
    referrals: Vec<Referral>,
    xform_ids: Vec<String>,
    doc_type: CaseDocType,
}

impl From<CaseLite> for Case {
    fn from(lite: CaseLite) -> Self {
        Self {
            case_id: lite.case_id,
            domain: lite.domain,
            case_type: lite.case_type,
            name: lite.name,
            owner_id: lite.owner_id,
            user_id: lite.user_id,
            external_id: lite.external_id,
            opened_on: lite.opened_on,
            modified_on: lite.modified_on,
            closed: lite.closed,
            closed_on: lite.closed_on,
            closed_by: lite.closed_by,
            properties: lite.properties,
            actions: Vec::new(),
            indices: lite.indices,
            attachments: lite.attachments,
            referrals: lite.referrals,
            xform_ids: lite.xform_ids,
            doc_type: lite.doc_type,
            rev: None,
            seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    fn form(id: &str, minute: u32, body: serde_json::Value) -> Form {
        Form::new(id, at(minute), body)
            .with_domain("demo")
            .with_user_id("user-1")
    }

    fn update(block: serde_json::Value) -> CaseUpdate {
        CaseUpdate::from_block(&block).unwrap()
    }

    #[test]
    fn doc_type_tags() {
        assert_eq!(CaseDocType::from_doc_type("CommCareCase"), Some(CaseDocType::Case));
        assert_eq!(
            CaseDocType::from_doc_type(CaseDocType::Deleted.as_str()),
            Some(CaseDocType::Deleted)
        );
        assert_eq!(CaseDocType::from_doc_type("XFormInstance"), None);
    }

    #[test]
    fn create_sets_base_fields() {
        let f = form("f1", 0, json!({}));
        let case = Case::from_case_update(
            &update(json!({
                "@case_id": "c1",
                "create": {"case_type": "person", "case_name": "Ann", "owner_id": "team-1"},
                "update": {"age": "31", "external_id": "ext-1"}
            })),
            &f,
            4,
        );
        assert_eq!(case.case_type, "person");
        assert_eq!(case.name, "Ann");
        assert_eq!(case.owner_id, "team-1");
        assert_eq!(case.user_id, "user-1");
        assert_eq!(case.external_id, "ext-1");
        assert_eq!(case.properties.get("age").map(String::as_str), Some("31"));
        assert_eq!(case.domain.as_deref(), Some("demo"));
        assert_eq!(case.opened_on, Some(at(0)));
        assert_eq!(case.xform_ids, vec!["f1"]);
        assert_eq!(case.actions.len(), 2);
        assert_eq!(case.actions[0].applied_seq, 4);
    }

    #[test]
    fn effective_owner_falls_back_to_user() {
        let case = Case::from_case_update(
            &update(json!({"@case_id": "c1", "create": {"case_type": "t"}})),
            &form("f1", 0, json!({})),
            0,
        );
        assert_eq!(case.effective_owner(), "user-1");
    }

    #[test]
    fn close_records_user_and_date() {
        let mut case = Case::new("c1", None);
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "close": {}})),
            &form("f2", 5, json!({})),
            0,
        );
        assert!(case.closed);
        assert_eq!(case.closed_on, Some(at(5)));
        assert_eq!(case.closed_by, "user-1");
    }

    #[test]
    fn index_replace_and_remove() {
        let mut case = Case::new("c2", None);
        let f = form("f1", 0, json!({}));
        case.update_from_case_update(
            &update(json!({"@case_id": "c2", "index": {
                "parent": {"@case_type": "household", "#text": "c1"},
                "other": {"@case_type": "x", "#text": "c3"}
            }})),
            &f,
            0,
        );
        assert_eq!(case.indices.len(), 2);

        case.update_from_case_update(
            &update(json!({"@case_id": "c2", "index": {
                "parent": {"@case_type": "household", "#text": "c9"},
                "other": {"@case_type": "x", "#text": ""}
            }})),
            &f,
            0,
        );
        assert_eq!(case.indices.len(), 1);
        assert_eq!(case.get_index("parent").unwrap().referenced_id, "c9");
        assert!(case.get_index("other").is_none());
    }

    #[test]
    fn replaced_attachment_moves_to_end() {
        let mut case = Case::new("c1", None);
        let f = form("f1", 0, json!({}));
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "attachment": {
                "photo": {"@src": "photo.jpg", "@from": "local"},
                "voice": {"@src": "voice.mp3", "@from": "local"}
            }})),
            &f,
            0,
        );
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "attachment": {
                "photo": {"@src": "photo2.jpg", "@from": "local"}
            }})),
            &form("f2", 1, json!({})),
            0,
        );
        let names: Vec<_> = case.attachments.iter().map(|a| a.identifier.as_str()).collect();
        assert_eq!(names, vec!["voice", "photo"]);
        assert_eq!(case.attachments[1].xform_id, "f2");

        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "attachment": {"voice": ""}})),
            &form("f3", 2, json!({})),
            0,
        );
        assert_eq!(case.attachments.len(), 1);
    }

    #[test]
    fn referral_open_then_close() {
        let mut case = Case::new("c1", None);
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "referral": {
                "referral_id": "r1",
                "followup_date": "2024-02-20",
                "open": {"referral_types": "t1 t2"}
            }})),
            &form("f1", 0, json!({})),
            0,
        );
        assert_eq!(case.referrals.len(), 2);

        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "referral": {
                "referral_id": "r1",
                "update": {"referral_type": "t1", "date_closed": "2024-02-21"}
            }})),
            &form("f2", 1, json!({})),
            0,
        );
        let t1 = case.referrals.iter().find(|r| r.referral_type == "t1").unwrap();
        assert!(t1.closed);
        assert!(!case.referrals.iter().find(|r| r.referral_type == "t2").unwrap().closed);
    }

    #[test]
    fn reconcile_orders_by_action_date() {
        let mut case = Case::new("c1", None);
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "@date_modified": "2024-01-01T12:10:00Z",
                "update": {"color": "blue"}})),
            &form("late", 10, json!({})),
            0,
        );
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "@date_modified": "2024-01-01T12:05:00Z",
                "update": {"color": "red"}})),
            &form("early", 5, json!({})),
            0,
        );
        assert_eq!(case.properties["color"], "red");

        case.reconcile_actions();
        assert_eq!(case.properties["color"], "blue");
        assert_eq!(case.xform_ids, vec!["late", "early"]);
        assert_eq!(case.modified_on, Some(at(10)));
    }

    #[test]
    fn fields_changed_since_seq() {
        let mut case = Case::new("c1", None);
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "create": {"case_type": "t", "case_name": "n"}})),
            &form("f1", 0, json!({})),
            1,
        );
        case.update_from_case_update(
            &update(json!({"@case_id": "c1", "update": {"case_name": "m", "color": "red"}})),
            &form("f2", 1, json!({})),
            9,
        );
        let changed: Vec<_> = case.fields_changed_since(5).into_iter().collect();
        assert_eq!(changed, vec!["case_name", "color"]);
        assert_eq!(case.field_value("case_name"), Some("m"));
        assert_eq!(case.field_value("color"), Some("red"));
    }

    #[test]
    fn reset_keeps_identity() {
        let mut case = Case::from_case_update(
            &update(json!({"@case_id": "c1", "create": {"case_type": "t"}, "close": {}})),
            &form("f1", 0, json!({})),
            0,
        );
        case.rev = Some(3);
        case.reset();
        assert_eq!(case.case_id, "c1");
        assert_eq!(case.domain.as_deref(), Some("demo"));
        assert_eq!(case.rev, Some(3));
        assert!(!case.closed);
        assert!(case.actions.is_empty());
        assert!(case.xform_ids.is_empty());
    }

    #[test]
    fn lite_projection_drops_actions() {
        let case = Case::from_case_update(
            &update(json!({"@case_id": "c1", "create": {"case_type": "t"}})),
            &form("f1", 0, json!({})),
            0,
        );
        let bytes = casesync_storage::encode(&case).unwrap();
        let lite: CaseLite = casesync_storage::decode(&bytes).unwrap();
        let projected = Case::from(lite);
        assert!(projected.actions.is_empty());
        assert_eq!(projected.case_type, "t");
        assert_eq!(projected.xform_ids, vec!["f1"]);
    }
}
