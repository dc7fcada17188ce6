//! Mutation queue status carried by every syncable row.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Position of a local row in the mutation queue.
///
/// ```text
/// create ──> PendingCreate ──remote create ok──> Synced
///                 │ edit: stays PendingCreate      │ edit
///                 │                                v
///                 │                          PendingUpdate ──remote update ok──> Synced
///                 └─── delete (any state) ──> PendingDelete ──remote delete ok──> (removed)
/// ```
///
/// A failed remote call leaves the status untouched; the next pass retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Synced,
}

impl SyncStatus {
    pub const ALL: [Self; 4] = [
        Self::PendingCreate,
        Self::PendingUpdate,
        Self::PendingDelete,
        Self::Synced,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingCreate => "pending_create",
            Self::PendingUpdate => "pending_update",
            Self::PendingDelete => "pending_delete",
            Self::Synced => "synced",
        }
    }

    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Synced)
    }

    /// Status after a local edit. Unsynced creates are edited in place.
    pub const fn after_local_edit(self) -> Self {
        match self {
            Self::PendingCreate => Self::PendingCreate,
            Self::PendingDelete => Self::PendingDelete,
            Self::PendingUpdate | Self::Synced => Self::PendingUpdate,
        }
    }

    /// Status after a local delete request.
    pub const fn after_local_delete(self) -> Self {
        Self::PendingDelete
    }

    /// Status after the remote store acknowledged the queued mutation.
    ///
    /// `None` means the row is physically removed.
    pub const fn after_remote_ack(self) -> Option<Self> {
        match self {
            Self::PendingDelete => None,
            Self::PendingCreate | Self::PendingUpdate | Self::Synced => Some(Self::Synced),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Database(format!("unknown sync_status '{s}'")))
    }
}
