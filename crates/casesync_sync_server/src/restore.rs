//! Producing restore payloads.

use crate::config::RestoreSettings;
use crate::error::{RestoreError, RestoreResult};
use crate::fixtures::FixtureProvider;
use crate::payload_cache::{initial_cache_key, PayloadCache};
use crate::sync_op::CaseSyncOperation;
use crate::user::User;
use casesync_core::Repository;
use casesync_sync_protocol::{
    case_element, error_response, registration_element, response_element, sync_element,
    CaseStateHash, ProtocolVersion, ResponseNature, SyncLog, SyncLogStore,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a client sent with its restore request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreRequest {
    /// Sync log id from the client's previous restore.
    pub restore_id: Option<String>,
    /// Requested protocol version.
    pub version: Option<String>,
    /// The client's case state hash.
    pub state_hash: Option<String>,
}

impl RestoreRequest {
    /// Creates a request for an initial restore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the previous sync token. Empty tokens are ignored.
    #[must_use]
    pub fn with_restore_id(mut self, restore_id: impl Into<String>) -> Self {
        let restore_id = restore_id.into();
        self.restore_id = (!restore_id.is_empty()).then_some(restore_id);
        self
    }

    /// Sets the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the claimed case state hash.
    #[must_use]
    pub fn with_state_hash(mut self, state_hash: impl Into<String>) -> Self {
        self.state_hash = Some(state_hash.into());
        self
    }
}

/// A rendered restore response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreResponse {
    /// HTTP-style status: 200, 412 when the client must restore from
    /// scratch, 500 otherwise.
    pub status: u16,
    /// The XML document.
    pub body: String,
}

impl RestoreResponse {
    /// Returns true for a successful restore.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// One restore for one user.
pub struct RestoreConfig<'a> {
    repo: &'a Repository,
    logs: &'a SyncLogStore,
    user: &'a User,
    request: RestoreRequest,
    settings: RestoreSettings,
    cache: Option<&'a dyn PayloadCache>,
    fixtures: &'a [Arc<dyn FixtureProvider>],
}

impl std::fmt::Debug for RestoreConfig<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreConfig")
            .field("user_id", &self.user.user_id)
            .field("request", &self.request)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> RestoreConfig<'a> {
    /// Creates a restore with default settings, no cache and no fixtures.
    pub fn new(
        repo: &'a Repository,
        logs: &'a SyncLogStore,
        user: &'a User,
        request: RestoreRequest,
    ) -> Self {
        Self {
            repo,
            logs,
            user,
            request,
            settings: RestoreSettings::default(),
            cache: None,
            fixtures: &[],
        }
    }

    /// Sets the restore settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RestoreSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the cache used for initial restores.
    #[must_use]
    pub fn with_cache(mut self, cache: &'a dyn PayloadCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the fixture providers.
    #[must_use]
    pub fn with_fixtures(mut self, fixtures: &'a [Arc<dyn FixtureProvider>]) -> Self {
        self.fixtures = fixtures;
        self
    }

    /// The requested protocol version, or the configured default.
    ///
    /// # Errors
    ///
    /// [`RestoreError::BadVersion`] for unsupported versions.
    pub fn version(&self) -> RestoreResult<ProtocolVersion> {
        match &self.request.version {
            None => Ok(self.settings.default_version),
            Some(v) => ProtocolVersion::parse(v).ok_or_else(|| RestoreError::BadVersion {
                version: v.clone(),
            }),
        }
    }

    /// Checks the request and loads the client's previous sync log.
    ///
    /// # Errors
    ///
    /// - [`RestoreError::BadVersion`] for unsupported versions
    /// - a sync log error if the restore id is unknown or the hash is
    ///   malformed
    /// - [`RestoreError::Consistency`] if the claimed hash differs from the
    ///   log's
    pub fn validate(&self) -> RestoreResult<Option<SyncLog>> {
        self.version()?;
        let Some(restore_id) = &self.request.restore_id else {
            return Ok(None);
        };
        let log = self.logs.fetch(restore_id)?;
        if let Some(claimed) = &self.request.state_hash {
            let actual = CaseStateHash::parse(claimed)?;
            let expected = log.get_state_hash();
            if actual != expected {
                return Err(RestoreError::Consistency {
                    expected,
                    actual,
                    case_ids: log.footprint().into_iter().collect(),
                });
            }
        }
        Ok(Some(log))
    }

    /// Builds the restore payload and records the new sync log.
    pub fn get_payload(&self) -> RestoreResult<String> {
        let version = self.version()?;
        let last_sync = self.validate()?;

        if let Some(cached) = self.cached_payload(last_sync.as_ref(), version) {
            debug!(user_id = %self.user.user_id, %version, "serving cached restore");
            return Ok(cached);
        }

        let owner_ids = self.user.owner_ids();
        let op = CaseSyncOperation::compute(self.repo, &owner_ids, last_sync.as_ref())?;
        let mut new_log = SyncLog::new(&self.user.user_id, self.repo.update_seq()?)
            .with_previous_log_id(last_sync.as_ref().map(|log| log.id.clone()))
            .with_owner_ids(owner_ids)
            .with_cases_on_phone(op.owned_states())
            .with_dependent_cases(op.extended_states());
        self.logs.save(&mut new_log)?;

        let mut items = vec![
            sync_element(&new_log.id),
            registration_element(&self.user.registration()),
        ];
        for provider in self.fixtures {
            let fixtures = provider.fixtures(self.user, version, last_sync.as_ref());
            debug!(provider = provider.name(), count = fixtures.len(), "adding fixtures");
            items.extend(fixtures);
        }
        items.extend(
            op.cases_to_sync
                .iter()
                .map(|update| case_element(&update.case, &update.content, version)),
        );

        let message = format!("Successfully restored account {}!", self.user.username);
        let payload =
            response_element(&message, ResponseNature::OtaRestoreSuccess, items).to_document();

        info!(
            user_id = %self.user.user_id,
            sync_log_id = %new_log.id,
            cases = op.cases_to_sync.len(),
            %version,
            "restore generated"
        );
        self.cache_payload(last_sync, version, &payload)?;
        Ok(payload)
    }

    /// Builds the response, mapping failures to an error document.
    pub fn get_response(&self) -> RestoreResponse {
        match self.get_payload() {
            Ok(body) => RestoreResponse { status: 200, body },
            Err(e) if e.is_client_error() => {
                warn!(user_id = %self.user.user_id, error = %e, "restore rejected");
                RestoreResponse {
                    status: 412,
                    body: error_response(&e.to_string()),
                }
            }
            Err(e) => {
                error!(user_id = %self.user.user_id, error = %e, "restore failed");
                RestoreResponse {
                    status: 500,
                    body: error_response(&e.to_string()),
                }
            }
        }
    }

    fn cached_payload(&self, last_sync: Option<&SyncLog>, version: ProtocolVersion) -> Option<String> {
        if !self.settings.caching_enabled {
            return None;
        }
        match last_sync {
            Some(log) => log.get_cached_payload(version).map(str::to_string),
            None => self
                .cache?
                .get(&initial_cache_key(&self.user.user_id, version)),
        }
    }

    /// Caches a payload on the previous sync log, or in the shared cache
    /// for initial restores.
    fn cache_payload(
        &self,
        last_sync: Option<SyncLog>,
        version: ProtocolVersion,
        payload: &str,
    ) -> RestoreResult<()> {
        if !self.settings.caching_enabled {
            return Ok(());
        }
        match last_sync {
            Some(mut log) => {
                log.set_cached_payload(version, payload);
                match self.logs.save(&mut log) {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_retryable() => {
                        warn!(sync_log_id = %log.id, error = %e, "skipping restore cache write");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                if let Some(cache) = self.cache {
                    cache.set(
                        &initial_cache_key(&self.user.user_id, version),
                        payload.to_string(),
                        self.settings.initial_cache_ttl,
                    );
                }
                Ok(())
            }
        }
    }
}
