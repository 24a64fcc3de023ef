//! Tag names used in submitted case blocks.

/// Key that identifies a case block inside a form.
pub const CASE_TAG: &str = "case";
/// Child element carrying the case id (version 1 blocks).
pub const CASE_TAG_ID: &str = "case_id";
/// Attribute carrying the case id (version 2 blocks).
pub const CASE_ATTR_ID: &str = "@case_id";
/// Attribute carrying the modification date.
pub const CASE_ATTR_DATE_MODIFIED: &str = "@date_modified";
/// Child element carrying the modification date.
pub const CASE_TAG_DATE_MODIFIED: &str = "date_modified";
/// Attribute carrying the submitting user.
pub const CASE_ATTR_USER_ID: &str = "@user_id";

/// Create action tag.
pub const CASE_ACTION_CREATE: &str = "create";
/// Update action tag.
pub const CASE_ACTION_UPDATE: &str = "update";
/// Close action tag.
pub const CASE_ACTION_CLOSE: &str = "close";
/// Index action tag.
pub const CASE_ACTION_INDEX: &str = "index";
/// Attachment action tag.
pub const CASE_ACTION_ATTACHMENT: &str = "attachment";
/// Referral action tag.
pub const CASE_ACTION_REFERRAL: &str = "referral";

/// Namespace attribute key on parsed form nodes.
pub const XMLNS_ATTR: &str = "@xmlns";
/// Namespace of device reports, which never carry case operations.
pub const DEVICE_REPORT_XMLNS: &str = "http://code.javarosa.org/devicereport";

/// Text content key on parsed form nodes that also carry attributes.
pub const TEXT_KEY: &str = "#text";
