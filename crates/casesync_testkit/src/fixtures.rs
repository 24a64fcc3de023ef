//! Test servers and users.

use crate::blocks::FormBuilder;
use casesync_core::Case;
use casesync_storage::InMemoryStore;
use casesync_sync_server::{
    ProcessingResult, RestoreRequest, RestoreResponse, ServerConfig, SyncServer, User,
};
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

/// A sync server over in-memory storage.
#[derive(Debug)]
pub struct TestServer {
    /// The server instance.
    pub server: SyncServer,
    /// The user restores are made for.
    pub user: User,
}

impl TestServer {
    /// Creates a server with default configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a server with the given configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        init_test_tracing();
        Self {
            server: SyncServer::new(Arc::new(InMemoryStore::new()), config),
            user: dummy_user(),
        }
    }

    /// Submits a form, returning the processing outcome.
    pub fn try_submit(&self, form: FormBuilder) -> ProcessingResult<Vec<Case>> {
        self.server.submit_form(form.build())
    }

    /// Submits a form that must succeed.
    pub fn submit(&self, form: FormBuilder) -> Vec<Case> {
        self.try_submit(form).expect("form should process")
    }

    /// Restores for the test user.
    pub fn restore(&self, request: RestoreRequest) -> RestoreResponse {
        self.server.handle_restore(&self.user, request)
    }

    /// Restores for the test user, optionally from a previous token, and
    /// returns the payload of a successful restore.
    pub fn restore_payload(&self, restore_id: Option<&str>) -> String {
        let request = match restore_id {
            Some(id) => RestoreRequest::new().with_restore_id(id),
            None => RestoreRequest::new(),
        };
        let response = self.restore(request);
        assert!(response.is_success(), "restore failed: {}", response.body);
        response.body
    }

    /// Loads a case that must exist.
    pub fn case(&self, case_id: &str) -> Case {
        self.server
            .repository()
            .get_case(case_id)
            .expect("case lookup should succeed")
            .expect("case should exist")
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// The user most scenarios restore as.
pub fn dummy_user() -> User {
    let joined = Utc
        .with_ymd_and_hms(2011, 6, 9, 0, 0, 0)
        .single()
        .expect("fixed timestamp is valid");
    User::new("foo", "mclovin", "changeme", joined).with_user_data("something", "arbitrary")
}

/// Installs a tracing subscriber honouring `RUST_LOG`, once per process.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Runs a test against a fresh server.
pub fn with_test_server<F, R>(f: F) -> R
where
    F: FnOnce(&TestServer) -> R,
{
    let server = TestServer::new();
    f(&server)
}
