//! Server configuration.

use casesync_core::{CaseProcessingConfig, CaseSettings};
use casesync_sync_protocol::ProtocolVersion;
use std::time::Duration;

/// Restore behavior.
#[derive(Debug, Clone)]
pub struct RestoreSettings {
    /// Cache generated payloads.
    pub caching_enabled: bool,
    /// Lifetime of payloads cached for clients without a sync token.
    pub initial_cache_ttl: Duration,
    /// Protocol version used when a request names none.
    pub default_version: ProtocolVersion,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            caching_enabled: false,
            initial_cache_ttl: Duration::from_secs(60 * 60),
            default_version: ProtocolVersion::V1,
        }
    }
}

impl RestoreSettings {
    /// Enables or disables payload caching.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// Sets the TTL of initial-restore cache entries.
    pub fn with_initial_cache_ttl(mut self, ttl: Duration) -> Self {
        self.initial_cache_ttl = ttl;
        self
    }

    /// Sets the default protocol version.
    pub fn with_default_version(mut self, version: ProtocolVersion) -> Self {
        self.default_version = version;
        self
    }
}

/// Configuration for the sync server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Process-wide case settings.
    pub case_settings: CaseSettings,
    /// Options for processing submitted forms.
    pub processing: CaseProcessingConfig,
    /// Restore behavior.
    pub restore: RestoreSettings,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the case settings.
    pub fn with_case_settings(mut self, settings: CaseSettings) -> Self {
        self.case_settings = settings;
        self
    }

    /// Sets the processing options.
    pub fn with_processing(mut self, processing: CaseProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    /// Sets the restore behavior.
    pub fn with_restore(mut self, restore: RestoreSettings) -> Self {
        self.restore = restore;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert!(config.case_settings.force_domain_check);
        assert!(config.processing.strict_asserts);
        assert!(!config.restore.caching_enabled);
        assert_eq!(config.restore.initial_cache_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_case_settings(CaseSettings::new().force_domain_check(false))
            .with_processing(CaseProcessingConfig::new().reconcile(true))
            .with_restore(
                RestoreSettings::default()
                    .with_caching(true)
                    .with_initial_cache_ttl(Duration::from_secs(5))
                    .with_default_version(ProtocolVersion::V2),
            );
        assert!(!config.case_settings.force_domain_check);
        assert!(config.processing.reconcile);
        assert!(config.restore.caching_enabled);
        assert_eq!(config.restore.default_version, ProtocolVersion::V2);
    }
}
