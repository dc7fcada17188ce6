//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Remote version rejected by last-write-wins during a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Local table of the record involved
    pub entity: String,
    /// Remote document id of the record involved
    pub remote_doc_id: String,
    /// Local row's timestamp when the conflict occurred
    pub local_modified_at: i64,
    /// Incoming remote timestamp that was rejected
    pub incoming_modified_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
