//! Main sync server.

use crate::config::ServerConfig;
use crate::error::ProcessingResult;
use crate::fixtures::FixtureProvider;
use crate::payload_cache::{InMemoryPayloadCache, PayloadCache};
use crate::processor::FormProcessor;
use crate::restore::{RestoreConfig, RestoreRequest, RestoreResponse};
use crate::user::User;
use casesync_core::{Case, CasesReceivedFeed, CasesReceivedListener, Form, Repository};
use casesync_storage::DocumentStore;
use casesync_sync_protocol::SyncLogStore;
use std::sync::Arc;

/// The sync server.
///
/// Accepts form submissions from devices and produces restore payloads
/// for them, over one document store.
///
/// # Example
///
/// ```
/// use casesync_storage::InMemoryStore;
/// use casesync_sync_server::{RestoreRequest, ServerConfig, SyncServer, User};
/// use chrono::Utc;
/// use std::sync::Arc;
///
/// let server = SyncServer::new(Arc::new(InMemoryStore::new()), ServerConfig::default());
/// let user = User::new("u1", "alice", "secret", Utc::now());
/// let response = server.handle_restore(&user, RestoreRequest::new());
/// assert!(response.is_success());
/// ```
pub struct SyncServer {
    config: ServerConfig,
    processor: FormProcessor,
    listeners: Arc<CasesReceivedFeed>,
    payload_cache: Arc<dyn PayloadCache>,
    fixtures: Vec<Arc<dyn FixtureProvider>>,
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("listeners", &self.listeners)
            .field("fixtures", &self.fixtures.len())
            .finish_non_exhaustive()
    }
}

impl SyncServer {
    /// Creates a sync server with an in-memory payload cache.
    pub fn new(store: Arc<dyn DocumentStore>, config: ServerConfig) -> Self {
        let listeners = Arc::new(CasesReceivedFeed::new());
        let processor = FormProcessor::new(Repository::new(store), &config, Arc::clone(&listeners));
        Self {
            config,
            processor,
            listeners,
            payload_cache: Arc::new(InMemoryPayloadCache::new()),
            fixtures: Vec::new(),
        }
    }

    /// Replaces the payload cache.
    #[must_use]
    pub fn with_payload_cache(mut self, cache: Arc<dyn PayloadCache>) -> Self {
        self.payload_cache = cache;
        self
    }

    /// Adds a fixture provider.
    #[must_use]
    pub fn with_fixture_provider(mut self, provider: Arc<dyn FixtureProvider>) -> Self {
        self.fixtures.push(provider);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the case and form repository.
    pub fn repository(&self) -> &Repository {
        self.processor.repository()
    }

    /// Returns the sync log store.
    pub fn sync_logs(&self) -> &SyncLogStore {
        self.processor.sync_logs()
    }

    /// Registers a listener for processed forms.
    pub fn subscribe(&self, listener: Arc<dyn CasesReceivedListener>) {
        self.listeners.subscribe(listener);
    }

    /// Handles a form submission.
    pub fn submit_form(&self, form: Form) -> ProcessingResult<Vec<Case>> {
        self.processor.submit(form)
    }

    /// Prepares a restore for a user.
    pub fn restore<'a>(&'a self, user: &'a User, request: RestoreRequest) -> RestoreConfig<'a> {
        RestoreConfig::new(self.repository(), self.sync_logs(), user, request)
            .with_settings(self.config.restore.clone())
            .with_cache(self.payload_cache.as_ref())
            .with_fixtures(&self.fixtures)
    }

    /// Handles a restore request.
    pub fn handle_restore(&self, user: &User, request: RestoreRequest) -> RestoreResponse {
        self.restore(user, request).get_response()
    }
}
