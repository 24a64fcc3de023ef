//! Restore payload elements.

use crate::version::ProtocolVersion;
use crate::xml::XmlElement;
use casesync_core::{Case, Referral};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Namespace of the OpenRosa response envelope.
pub const RESPONSE_XMLNS: &str = "http://openrosa.org/http/response";
/// Namespace of the sync token block.
pub const SYNC_XMLNS: &str = "http://commcarehq.org/sync";
/// Namespace of the registration block.
pub const REGISTRATION_XMLNS: &str = "http://openrosa.org/user/registration";
/// Namespace of version 2 case blocks.
pub const V2_CASE_XMLNS: &str = "http://commcarehq.org/case/transaction/v2";

/// Machine-readable nature of a response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseNature {
    /// A restore succeeded.
    OtaRestoreSuccess,
    /// A restore failed.
    OtaRestoreError,
}

impl ResponseNature {
    /// Returns the wire form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OtaRestoreSuccess => "ota_restore_success",
            Self::OtaRestoreError => "ota_restore_error",
        }
    }
}

/// Which parts of a case go into its restore block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseXmlContent {
    /// Emit a create block (the client has never seen the case).
    pub create: bool,
    /// Fields to put in the update block; `None` means every field.
    pub fields: Option<BTreeSet<String>>,
    /// Emit a close block.
    pub close: bool,
    /// Emit the index block.
    pub index: bool,
}

impl CaseXmlContent {
    /// Content for a case new to the client.
    #[must_use]
    pub fn full(case: &Case) -> Self {
        Self {
            create: true,
            fields: None,
            close: case.closed,
            index: true,
        }
    }

    /// Content for a case the client holds, sending `changed` fields.
    #[must_use]
    pub fn changed(case: &Case, changed: BTreeSet<String>) -> Self {
        Self {
            create: false,
            fields: Some(changed),
            close: case.closed,
            index: true,
        }
    }

    fn includes(&self, keys: &[&str]) -> bool {
        match &self.fields {
            None => true,
            Some(fields) => keys.iter().any(|k| fields.contains(*k)),
        }
    }
}

/// User registration data sent with every restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Login name.
    pub username: String,
    /// Password hash.
    pub password: String,
    /// User id.
    pub uuid: String,
    /// When the user joined.
    pub date_joined: DateTime<Utc>,
    /// Free-form user data.
    pub user_data: BTreeMap<String, String>,
}

fn date_string(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Builds the restore block of one case.
pub fn case_element(case: &Case, content: &CaseXmlContent, version: ProtocolVersion) -> XmlElement {
    match version {
        ProtocolVersion::V1 => v1_case_element(case, content),
        ProtocolVersion::V2 => v2_case_element(case, content),
    }
}

fn v1_case_element(case: &Case, content: &CaseXmlContent) -> XmlElement {
    let base = [
        ("case_type_id", case.case_type.as_str(), &["case_type", "case_type_id"][..]),
        ("user_id", case.user_id.as_str(), &["user_id"][..]),
        ("case_name", case.name.as_str(), &["case_name"][..]),
        ("external_id", case.external_id.as_str(), &["external_id"][..]),
    ];

    let mut el = XmlElement::new("case")
        .with_child(XmlElement::text_element("case_id", &case.case_id))
        .with_child(XmlElement::text_element(
            "date_modified",
            date_string(case.modified_on.map(|d| d.date_naive())),
        ));

    let mut update = XmlElement::new("update");
    if content.create {
        let mut create = XmlElement::new("create");
        for (tag, value, _) in base {
            create.push(XmlElement::text_element(tag, value));
        }
        el.push(create);
    } else {
        for (tag, value, keys) in base {
            if content.includes(keys) {
                update.push(XmlElement::text_element(tag, value));
            }
        }
    }
    push_properties(&mut update, case, content);
    if !update.is_empty() {
        el.push(update);
    }
    push_close_and_index(&mut el, case, content);
    for referral in &case.referrals {
        el.push(referral_element(referral));
    }
    el
}

fn v2_case_element(case: &Case, content: &CaseXmlContent) -> XmlElement {
    let mut el = XmlElement::new("case")
        .with_attr("xmlns", V2_CASE_XMLNS)
        .with_attr("case_id", &case.case_id)
        .with_attr(
            "date_modified",
            case.modified_on
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        )
        .with_attr("user_id", &case.user_id);

    let mut update = XmlElement::new("update");
    if content.create {
        el.push(
            XmlElement::new("create")
                .with_child(XmlElement::text_element("case_type", &case.case_type))
                .with_child(XmlElement::text_element("case_name", &case.name))
                .with_child(XmlElement::text_element("owner_id", case.effective_owner())),
        );
        if !case.external_id.is_empty() {
            update.push(XmlElement::text_element("external_id", &case.external_id));
        }
    } else {
        let base = [
            ("case_type", case.case_type.as_str(), &["case_type", "case_type_id"][..]),
            ("case_name", case.name.as_str(), &["case_name"][..]),
            ("owner_id", case.effective_owner(), &["owner_id"][..]),
            ("external_id", case.external_id.as_str(), &["external_id"][..]),
        ];
        for (tag, value, keys) in base {
            if content.includes(keys) {
                update.push(XmlElement::text_element(tag, value));
            }
        }
    }
    push_properties(&mut update, case, content);
    if !update.is_empty() {
        el.push(update);
    }
    push_close_and_index(&mut el, case, content);
    if content.create && !case.attachments.is_empty() {
        let mut attachments = XmlElement::new("attachment");
        for attachment in &case.attachments {
            let mut a = XmlElement::new(&attachment.identifier)
                .with_attr("src", &attachment.attachment_src);
            if let Some(from) = &attachment.attachment_from {
                a = a.with_attr("from", from);
            }
            attachments.push(a);
        }
        el.push(attachments);
    }
    el
}

fn push_properties(update: &mut XmlElement, case: &Case, content: &CaseXmlContent) {
    for (key, value) in &case.properties {
        if content.includes(&[key.as_str()]) {
            update.push(XmlElement::text_element(key, value));
        }
    }
}

fn push_close_and_index(el: &mut XmlElement, case: &Case, content: &CaseXmlContent) {
    if content.close {
        el.push(XmlElement::new("close"));
    }
    if content.index && !case.indices.is_empty() {
        let mut index = XmlElement::new("index");
        for i in &case.indices {
            index.push(
                XmlElement::text_element(&i.identifier, &i.referenced_id)
                    .with_attr("case_type", &i.referenced_type),
            );
        }
        el.push(index);
    }
}

fn referral_element(referral: &Referral) -> XmlElement {
    let mut el = XmlElement::new("referral")
        .with_child(XmlElement::text_element("referral_id", &referral.referral_id))
        .with_child(XmlElement::text_element(
            "followup_date",
            date_string(referral.followup_on),
        ))
        .with_child(
            XmlElement::new("open")
                .with_child(XmlElement::text_element("referral_types", &referral.referral_type)),
        );
    if referral.closed {
        el.push(
            XmlElement::new("update")
                .with_child(XmlElement::text_element("referral_type", &referral.referral_type))
                .with_child(XmlElement::text_element(
                    "date_closed",
                    date_string(referral.closed_on),
                )),
        );
    }
    el
}

/// Builds the sync token block.
pub fn sync_element(restore_id: &str) -> XmlElement {
    XmlElement::new("Sync")
        .with_attr("xmlns", SYNC_XMLNS)
        .with_child(XmlElement::text_element("restore_id", restore_id))
}

/// Builds the registration block.
pub fn registration_element(registration: &Registration) -> XmlElement {
    let mut el = XmlElement::new("Registration")
        .with_attr("xmlns", REGISTRATION_XMLNS)
        .with_child(XmlElement::text_element("username", &registration.username))
        .with_child(XmlElement::text_element("password", &registration.password))
        .with_child(XmlElement::text_element("uuid", &registration.uuid))
        .with_child(XmlElement::text_element(
            "date",
            registration.date_joined.format("%Y-%m-%d").to_string(),
        ));
    if !registration.user_data.is_empty() {
        let mut data = XmlElement::new("user_data");
        for (key, value) in &registration.user_data {
            data.push(XmlElement::text_element("data", value).with_attr("key", key));
        }
        el.push(data);
    }
    el
}

/// Builds an OpenRosa response envelope carrying `items` after the message.
pub fn response_element(
    message: &str,
    nature: ResponseNature,
    items: impl IntoIterator<Item = XmlElement>,
) -> XmlElement {
    let mut el = XmlElement::new("OpenRosaResponse")
        .with_attr("xmlns", RESPONSE_XMLNS)
        .with_child(XmlElement::text_element("message", message).with_attr("nature", nature.as_str()));
    for item in items {
        el.push(item);
    }
    el
}

/// Renders a restore error document.
pub fn error_response(message: &str) -> String {
    response_element(message, ResponseNature::OtaRestoreError, std::iter::empty()).to_document()
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_core::{CaseIndex, CaseUpdate, Form};
    use chrono::TimeZone;
    use serde_json::json;

    fn asdf() -> Case {
        let form = Form::new(
            "f1",
            Utc.with_ymd_and_hms(2010, 6, 29, 13, 42, 50).unwrap(),
            json!({}),
        )
        .with_user_id("foo");
        let update = CaseUpdate::from_block(&json!({
            "case_id": "asdf",
            "date_modified": "2010-06-29T13:42:50",
            "create": {"case_type_id": "test_case_type", "user_id": "foo", "case_name": "test case name"},
            "update": {"external_id": "someexternal", "color": "red"}
        }))
        .unwrap();
        Case::from_case_update(&update, &form, 0)
    }

    #[test]
    fn v1_create_block() {
        let xml = case_element(&asdf(), &CaseXmlContent::full(&asdf()), ProtocolVersion::V1).to_string();
        assert!(xml.starts_with("<case><case_id>asdf</case_id><date_modified>2010-06-29</date_modified><create>"));
        assert!(xml.contains("<case_type_id>test_case_type</case_type_id>"));
        assert!(xml.contains("<user_id>foo</user_id>"));
        assert!(xml.contains("<case_name>test case name</case_name>"));
        assert!(xml.contains("<external_id>someexternal</external_id>"));
        assert!(xml.contains("<update><color>red</color></update>"));
        assert!(!xml.contains("<close"));
    }

    #[test]
    fn v1_update_carries_only_changed_fields() {
        let case = asdf();
        let changed = ["case_name".to_string()].into_iter().collect();
        let xml = case_element(&case, &CaseXmlContent::changed(&case, changed), ProtocolVersion::V1)
            .to_string();
        assert!(!xml.contains("<create>"));
        assert!(xml.contains("<update><case_name>test case name</case_name></update>"));
        assert!(!xml.contains("color"));
    }

    #[test]
    fn empty_update_is_omitted() {
        let case = asdf();
        let xml = case_element(
            &case,
            &CaseXmlContent::changed(&case, BTreeSet::new()),
            ProtocolVersion::V1,
        )
        .to_string();
        assert!(!xml.contains("<update"));
    }

    #[test]
    fn v2_shape() {
        let mut case = asdf();
        case.closed = true;
        case.indices.push(CaseIndex::new("parent", "household", "home"));
        let xml = case_element(&case, &CaseXmlContent::full(&case), ProtocolVersion::V2).to_string();
        assert!(xml.starts_with(&format!("<case xmlns=\"{V2_CASE_XMLNS}\" case_id=\"asdf\"")));
        assert!(xml.contains("<create><case_type>test_case_type</case_type><case_name>test case name</case_name><owner_id>foo</owner_id></create>"));
        assert!(xml.contains("<external_id>someexternal</external_id>"));
        assert!(xml.contains("<close/>"));
        assert!(xml.contains("<index><parent case_type=\"household\">home</parent></index>"));
    }

    #[test]
    fn registration_with_user_data() {
        let registration = Registration {
            username: "mclovin".into(),
            password: "guest".into(),
            uuid: "foo".into(),
            date_joined: Utc.with_ymd_and_hms(2011, 6, 9, 0, 0, 0).unwrap(),
            user_data: [("something".to_string(), "arbitrary".to_string())]
                .into_iter()
                .collect(),
        };
        let xml = registration_element(&registration).to_string();
        assert!(xml.contains("<username>mclovin</username>"));
        assert!(xml.contains("<date>2011-06-09</date>"));
        assert!(xml.contains("<data key=\"something\">arbitrary</data>"));
    }

    #[test]
    fn error_document() {
        let doc = error_response("bad hash");
        assert!(doc.starts_with("<?xml"));
        assert!(doc.contains("<message nature=\"ota_restore_error\">bad hash</message>"));
    }
}
