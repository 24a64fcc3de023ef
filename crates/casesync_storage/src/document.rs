//! Document envelope types.

/// A secondary index entry emitted by the writer of a document.
///
/// Views are keyed by `(view, key)` and resolve to document ids. A document
/// may emit any number of entries; they are replaced wholesale on each write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewEntry {
    /// View name.
    pub view: String,
    /// Key within the view.
    pub key: String,
}

impl ViewEntry {
    /// Creates a view entry.
    pub fn new(view: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            key: key.into(),
        }
    }
}

/// A document as it is handed to the store.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    /// Document id.
    pub id: String,
    /// Document type tag (e.g. `CommCareCase`, `SyncLog`).
    pub doc_type: String,
    /// Encoded body.
    pub body: Vec<u8>,
    /// View entries for this revision.
    pub views: Vec<ViewEntry>,
}

impl DocumentWrite {
    /// Creates a write without view entries.
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            body,
            views: Vec::new(),
        }
    }

    /// Adds a view entry.
    pub fn with_view(mut self, entry: ViewEntry) -> Self {
        self.views.push(entry);
        self
    }

    /// Adds several view entries.
    pub fn with_views(mut self, entries: impl IntoIterator<Item = ViewEntry>) -> Self {
        self.views.extend(entries);
        self
    }
}

/// A document as it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document id.
    pub id: String,
    /// Document type tag.
    pub doc_type: String,
    /// Revision, starting at 1 and increasing by one per write.
    pub rev: u64,
    /// Store change sequence of the write that produced this revision.
    pub seq: u64,
    /// Encoded body.
    pub body: Vec<u8>,
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    /// New revision of the document.
    pub rev: u64,
    /// Change sequence assigned to the write.
    pub seq: u64,
}
