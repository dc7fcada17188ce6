//! Shared sync state indicator.

use std::fmt;

/// Sync indicator surfaced to every client.
///
/// Reflects only the latest pass outcome; no partial-progress detail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Syncing,
    #[default]
    Synced,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "sync error",
        };
        f.write_str(label)
    }
}
