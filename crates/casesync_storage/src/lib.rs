//! # casesync Storage
//!
//! Document store contract and implementations for casesync.
//!
//! This crate provides the lowest-level storage abstraction. Stores are
//! **opaque document stores**: they keep an encoded body per id together with
//! a revision and a global change sequence, and maintain the secondary index
//! entries ("views") the writer hands them. They never interpret bodies.
//!
//! ## Design Principles
//!
//! - Get-by-id, batched get, write with optimistic concurrency, view query
//! - Revisions increase by one per write; a stale expected revision is a
//!   [`StorageError::Conflict`]
//! - Every write advances a store-wide change sequence
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Example
//!
//! ```rust
//! use casesync_storage::{DocumentStore, DocumentWrite, InMemoryStore, ViewEntry};
//!
//! let store = InMemoryStore::new();
//! let write = DocumentWrite::new("doc-1", "Note", b"hello".to_vec())
//!     .with_view(ViewEntry::new("by_author", "alice"));
//! let receipt = store.put(write, None).unwrap();
//! assert_eq!(receipt.rev, 1);
//! assert_eq!(store.query_view("by_author", "alice").unwrap(), vec!["doc-1"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod document;
mod error;
mod memory;
mod store;

pub use codec::{decode, encode};
pub use document::{DocumentWrite, StoredDocument, ViewEntry, WriteReceipt};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use store::DocumentStore;
