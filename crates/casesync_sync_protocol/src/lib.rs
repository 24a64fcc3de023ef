//! # casesync Sync Protocol
//!
//! Replication cursor and payload formats for casesync.
//!
//! This crate provides:
//! - [`SyncLog`], the per-client replication cursor, and its store
//! - [`CaseStateHash`] summarizing the client's case footprint
//! - Phone-list bookkeeping during form processing
//!   ([`SyncLog::update_phone_lists`])
//! - Protocol versions and the XML restore payload
//!
//! Only the sync log store touches storage; the payload builders are pure.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod case_state;
mod error;
mod hash;
mod payload;
mod store;
mod sync_log;
mod version;
mod xml;

pub use case_state::CaseState;
pub use error::{SyncLogError, SyncLogResult};
pub use hash::CaseStateHash;
pub use payload::{
    case_element, error_response, registration_element, response_element, sync_element,
    CaseXmlContent, Registration, ResponseNature, REGISTRATION_XMLNS, RESPONSE_XMLNS, SYNC_XMLNS,
    V2_CASE_XMLNS,
};
pub use store::SyncLogStore;
pub use sync_log::SyncLog;
pub use version::ProtocolVersion;
pub use xml::{escape, XmlElement, XmlNode};
