//! Case actions: the entries of a case's event log.

use super::model::CaseIndex;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of a case action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseActionType {
    /// Opens the case.
    Create,
    /// Sets fields and properties.
    Update,
    /// Closes the case.
    Close,
    /// Adds, replaces or removes indices.
    Index,
    /// Adds, replaces or removes attachments.
    Attachment,
    /// Opens, updates or closes referrals.
    Referral,
}

impl CaseActionType {
    /// Returns the block tag this action is parsed from.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Close => "close",
            Self::Index => "index",
            Self::Attachment => "attachment",
            Self::Referral => "referral",
        }
    }
}

impl std::fmt::Display for CaseActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to one named attachment. No source means removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentChange {
    /// Attachment name on the case.
    pub identifier: String,
    /// Source reference of the new attachment.
    pub src: Option<String>,
    /// Origin of the attachment (`local`, `remote`, ...).
    pub from: Option<String>,
}

impl AttachmentChange {
    /// Returns true if this change removes the attachment.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.src.is_none()
    }
}

/// A referral operation carried by one case block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralChange {
    /// The referral id.
    pub referral_id: String,
    /// Follow-up date.
    pub followup_on: Option<NaiveDate>,
    /// Types of referrals to open.
    pub open_types: Vec<String>,
    /// Type of an existing referral to update.
    pub update_type: Option<String>,
    /// Closing date for the updated referral.
    pub closed_on: Option<NaiveDate>,
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPayload {
    /// Create with its initial fields.
    Create {
        /// Field name to value.
        fields: BTreeMap<String, String>,
    },
    /// Update with the changed fields.
    Update {
        /// Field name to value.
        fields: BTreeMap<String, String>,
    },
    /// Close.
    Close,
    /// Index changes; an empty `referenced_id` removes the index.
    Index {
        /// Submitted indices.
        indices: Vec<CaseIndex>,
    },
    /// Attachment changes.
    Attachment {
        /// Submitted attachment changes.
        changes: Vec<AttachmentChange>,
    },
    /// Referral change.
    Referral {
        /// Submitted referral change.
        change: ReferralChange,
    },
}

/// One entry of a case's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAction {
    /// What the action does.
    pub payload: ActionPayload,
    /// Client-side modification date (falls back to `server_date`).
    pub date: DateTime<Utc>,
    /// When the originating form was received.
    pub server_date: DateTime<Utc>,
    /// The originating form.
    pub xform_id: String,
    /// The submitting user.
    pub user_id: String,
    /// Storage change sequence observed when the action was applied.
    pub applied_seq: u64,
}

impl CaseAction {
    /// Returns the action type.
    #[must_use]
    pub fn action_type(&self) -> CaseActionType {
        match self.payload {
            ActionPayload::Create { .. } => CaseActionType::Create,
            ActionPayload::Update { .. } => CaseActionType::Update,
            ActionPayload::Close => CaseActionType::Close,
            ActionPayload::Index { .. } => CaseActionType::Index,
            ActionPayload::Attachment { .. } => CaseActionType::Attachment,
            ActionPayload::Referral { .. } => CaseActionType::Referral,
        }
    }

    /// Returns the fields written by a create or update action.
    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        match &self.payload {
            ActionPayload::Create { fields } | ActionPayload::Update { fields } => Some(fields),
            _ => None,
        }
    }
}
