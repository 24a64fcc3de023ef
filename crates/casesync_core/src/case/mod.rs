//! The case aggregate.
//!
//! A [`Case`] is a long-lived record mutated by forms. Each form contributes
//! [`CaseAction`]s to the case's append-only log; the remaining fields are a
//! materialization of that log. [`CaseUpdate`] is the transient, parsed form
//! of one submitted case block.

mod action;
mod model;
mod update;

pub use action::{ActionPayload, AttachmentChange, CaseAction, CaseActionType, ReferralChange};
pub use model::{Case, CaseAttachment, CaseDocType, CaseIndex, CaseLite, Referral};
pub use update::CaseUpdate;
