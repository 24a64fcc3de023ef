//! Extra restore content.

use crate::user::User;
use casesync_sync_protocol::{ProtocolVersion, SyncLog, XmlElement};

/// Contributes elements to every restore payload, after the registration
/// block and before the cases.
pub trait FixtureProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns the elements for this restore.
    fn fixtures(
        &self,
        user: &User,
        version: ProtocolVersion,
        last_sync: Option<&SyncLog>,
    ) -> Vec<XmlElement>;
}
