//! # casesync Core
//!
//! Case event-sourcing engine for casesync.
//!
//! This crate provides:
//! - The [`Case`] aggregate and its append-only [`CaseAction`] log
//! - [`Form`] submissions and case-block extraction
//! - The case update engine ([`CaseUpdateEngine`]) folding forms into cases
//! - Full case rebuild from form history ([`rebuild_case`])
//! - A per-operation case cache ([`CaseDbCache`]) composed with a separate
//!   access validator ([`CaseDocValidator`])
//! - "Cases received" listeners ([`CasesReceivedFeed`])
//!
//! ## Key Invariants
//!
//! - A case is a materialized view; replaying its actions in form-received
//!   order reproduces it
//! - Every case index points at a case that exists once a form commits
//! - Cases are never hard-deleted; an empty valid history tombstones them

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod case;
mod config;
pub mod consts;
mod engine;
mod error;
mod form;
mod listener;
mod rebuild;
mod repository;
mod validator;

pub use cache::CaseDbCache;
pub use case::{
    ActionPayload, AttachmentChange, Case, CaseAction, CaseActionType, CaseAttachment, CaseDocType,
    CaseIndex, CaseLite, CaseUpdate, Referral, ReferralChange,
};
pub use config::{CacheConfig, CaseProcessingConfig, CaseSettings};
pub use engine::{cases_referenced_by_form, check_form_domain, CaseUpdateEngine};
pub use error::{CaseError, CaseResult};
pub use form::{extract_case_blocks, Form, FormDisposition};
pub use listener::{CasesReceivedFeed, CasesReceivedListener, ListenerError};
pub use rebuild::rebuild_case;
pub use repository::{views, Repository};
pub use validator::CaseDocValidator;
