//! Case processing configuration.

use crate::validator::CaseDocValidator;

/// Process-wide case settings.
#[derive(Debug, Clone)]
pub struct CaseSettings {
    /// Reject forms that carry no domain.
    pub force_domain_check: bool,
}

impl Default for CaseSettings {
    fn default() -> Self {
        Self {
            force_domain_check: true,
        }
    }
}

impl CaseSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether forms without a domain are rejected.
    #[must_use]
    pub const fn force_domain_check(mut self, value: bool) -> Self {
        self.force_domain_check = value;
        self
    }
}

/// Configuration of a [`crate::CaseDbCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Domain every admitted case must belong to (unchecked when `None`).
    pub domain: Option<String>,
    /// Admit tombstoned cases.
    pub deleted_ok: bool,
    /// Load cases through the lite projection (no action history).
    pub strip_history: bool,
    /// Maximum number of ids fetched per storage round trip in `populate`.
    pub populate_chunk_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            domain: None,
            deleted_ok: false,
            strip_history: false,
            populate_chunk_size: 100,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the cache to one domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets whether tombstoned cases are admitted.
    #[must_use]
    pub const fn deleted_ok(mut self, value: bool) -> Self {
        self.deleted_ok = value;
        self
    }

    /// Builds the access validator matching this configuration.
    #[must_use]
    pub fn validator(&self) -> CaseDocValidator {
        CaseDocValidator::new(self.domain.clone(), self.deleted_ok)
    }

    /// Sets whether history is stripped on load.
    #[must_use]
    pub const fn strip_history(mut self, value: bool) -> Self {
        self.strip_history = value;
        self
    }

    /// Sets the populate chunk size (minimum 1).
    #[must_use]
    pub fn populate_chunk_size(mut self, size: usize) -> Self {
        self.populate_chunk_size = size.max(1);
        self
    }
}

/// Options for processing the cases of one form.
#[derive(Debug, Clone)]
pub struct CaseProcessingConfig {
    /// Re-derive touched cases from their action log after applying the form,
    /// and prune stale dependent cases from the client's sync log.
    pub reconcile: bool,
    /// Raise sync log assertions instead of logging them.
    pub strict_asserts: bool,
}

impl Default for CaseProcessingConfig {
    fn default() -> Self {
        Self {
            reconcile: false,
            strict_asserts: true,
        }
    }
}

impl CaseProcessingConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets reconcile mode.
    #[must_use]
    pub const fn reconcile(mut self, value: bool) -> Self {
        self.reconcile = value;
        self
    }

    /// Sets strict assertion mode.
    #[must_use]
    pub const fn strict_asserts(mut self, value: bool) -> Self {
        self.strict_asserts = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert!(CaseSettings::default().force_domain_check);
        let cache = CacheConfig::default();
        assert!(cache.domain.is_none());
        assert!(!cache.deleted_ok);
        assert!(!cache.strip_history);
        assert_eq!(cache.populate_chunk_size, 100);
        let processing = CaseProcessingConfig::default();
        assert!(!processing.reconcile);
        assert!(processing.strict_asserts);
    }

    #[test]
    fn builder_pattern() {
        let cache = CacheConfig::new()
            .domain("demo")
            .deleted_ok(true)
            .strip_history(true)
            .populate_chunk_size(0);
        assert_eq!(cache.domain.as_deref(), Some("demo"));
        assert!(cache.deleted_ok);
        assert!(cache.strip_history);
        assert_eq!(cache.populate_chunk_size, 1);

        let processing = CaseProcessingConfig::new()
            .reconcile(true)
            .strict_asserts(false);
        assert!(processing.reconcile);
        assert!(!processing.strict_asserts);
    }
}
