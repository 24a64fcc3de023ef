//! # casesync Testkit
//!
//! Test utilities for casesync.
//!
//! This crate provides:
//! - Test servers over in-memory storage
//! - Builders for case blocks and forms
//! - Helpers for inspecting restore payloads
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use casesync_testkit::prelude::*;
//!
//! #[test]
//! fn create_then_restore() {
//!     let server = TestServer::new();
//!     server.submit(FormBuilder::new("f1").block(CaseBlock::new("c1").create("t", "name")));
//!     let payload = server.restore_payload(None);
//!     assert_eq!(count_case_blocks(&payload), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod blocks;
pub mod fixtures;
pub mod generators;
pub mod payload;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blocks::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::payload::*;
}

pub use blocks::*;
pub use fixtures::*;
pub use generators::*;
pub use payload::*;
