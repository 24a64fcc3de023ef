//! Restoring users.

use casesync_sync_protocol::Registration;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A user restoring a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable id; also the user's own owner id.
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Password as sent in the registration block.
    pub password: String,
    /// When the account was created.
    pub date_joined: DateTime<Utc>,
    /// Arbitrary key/value data sent to the device.
    pub user_data: BTreeMap<String, String>,
    /// Groups whose cases the user also owns.
    pub group_ids: Vec<String>,
}

impl User {
    /// Creates a user with no extra data or groups.
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        date_joined: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            password: password.into(),
            date_joined,
            user_data: BTreeMap::new(),
            group_ids: Vec::new(),
        }
    }

    /// Adds a user data entry.
    #[must_use]
    pub fn with_user_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_data.insert(key.into(), value.into());
        self
    }

    /// Adds a group.
    #[must_use]
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_ids.push(group_id.into());
        self
    }

    /// Owner ids whose cases belong on this user's device: the user id
    /// followed by each group, without repeats.
    pub fn owner_ids(&self) -> Vec<String> {
        let mut ids = vec![self.user_id.clone()];
        for group in &self.group_ids {
            if !ids.contains(group) {
                ids.push(group.clone());
            }
        }
        ids
    }

    /// Builds the registration block contents.
    pub fn registration(&self) -> Registration {
        Registration {
            username: self.username.clone(),
            password: self.password.clone(),
            uuid: self.user_id.clone(),
            date_joined: self.date_joined,
            user_data: self.user_data.clone(),
        }
    }
}
