//! Restore payload caching.

use casesync_sync_protocol::ProtocolVersion;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A shared key/value cache for rendered restore payloads.
pub trait PayloadCache: Send + Sync {
    /// Returns a live entry.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores an entry that expires after `ttl`.
    fn set(&self, key: &str, payload: String, ttl: Duration);
}

/// Key under which a user's initial restore is cached.
pub fn initial_cache_key(user_id: &str, version: ProtocolVersion) -> String {
    hex::encode(Sha256::digest(format!("ota-restore-{user_id}-{version}")))
}

#[derive(Debug)]
struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

/// Process-local [`PayloadCache`].
#[derive(Debug, Default)]
pub struct InMemoryPayloadCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryPayloadCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PayloadCache for InMemoryPayloadCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.payload.clone())
    }

    /// Expired entries are evicted on every write.
    fn set(&self, key: &str, payload: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(key.to_string(), CacheEntry { payload, expires_at: now + ttl });
    }
}
