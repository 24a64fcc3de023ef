//! Case state hash.

use crate::error::{SyncLogError, SyncLogResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest of the set of case ids a client holds.
///
/// Rendered as `ccsh:` followed by the hex SHA-256 of the sorted ids
/// concatenated without separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseStateHash {
    hash: String,
}

impl CaseStateHash {
    /// Prefix of the rendered form.
    pub const PREFIX: &'static str = "ccsh:";

    /// Computes the hash of a set of case ids. Order does not matter.
    pub fn compute<I, S>(case_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<S> = case_ids.into_iter().collect();
        ids.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
        let mut hasher = Sha256::new();
        for id in &ids {
            hasher.update(id.as_ref().as_bytes());
        }
        Self {
            hash: hex::encode(hasher.finalize()),
        }
    }

    /// Parses the rendered form.
    ///
    /// # Errors
    ///
    /// [`SyncLogError::BadStateHash`] if the prefix is missing or the digest
    /// is not 64 hex digits.
    pub fn parse(value: &str) -> SyncLogResult<Self> {
        let bad = || SyncLogError::BadStateHash {
            value: value.to_string(),
        };
        let hash = value.trim().strip_prefix(Self::PREFIX).ok_or_else(bad)?;
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(bad());
        }
        Ok(Self {
            hash: hash.to_ascii_lowercase(),
        })
    }

    /// Returns the hex digest without prefix.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for CaseStateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.hash)
    }
}
