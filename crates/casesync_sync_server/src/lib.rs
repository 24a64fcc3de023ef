//! # casesync Sync Server
//!
//! Server side of the casesync protocol.
//!
//! This crate provides:
//! - The form processing pipeline ([`FormProcessor`]): store, apply cases,
//!   check the client's sync log, notify listeners, mark processed
//! - Reconciliation when a client's sync log disagrees with history
//! - The restore coordinator ([`RestoreConfig`]) producing incremental,
//!   hash-verified payloads
//! - A [`SyncServer`] facade wiring it all over one document store
//!
//! # Pipeline
//!
//! 1. The form is stored as submitted
//! 2. Its case blocks are applied; an integrity failure marks it as an error
//! 3. Touched cases are saved
//! 4. If the form carries a sync token, the sync log is updated; an
//!    inconsistency triggers reprocessing of the affected case's forms
//! 5. Listeners are notified and the form is marked processed

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod fixtures;
mod payload_cache;
mod processor;
mod restore;
mod server;
mod sync_op;
mod user;

pub use config::{RestoreSettings, ServerConfig};
pub use error::{ProcessingError, ProcessingResult, RestoreError, RestoreResult};
pub use fixtures::FixtureProvider;
pub use payload_cache::{initial_cache_key, InMemoryPayloadCache, PayloadCache};
pub use processor::FormProcessor;
pub use restore::{RestoreConfig, RestoreRequest, RestoreResponse};
pub use server::SyncServer;
pub use sync_op::{CaseSyncOperation, CaseSyncUpdate};
pub use user::User;
