//! Local syncable row model

use serde::{Deserialize, Serialize};

use super::SyncStatus;

/// Domain field values keyed by column name.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A row of any syncable local table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Primary key, meaningful only inside this local store
    pub local_id: i64,
    /// Permanent cross-store correlation key, once assigned
    pub remote_doc_id: Option<String>,
    /// Mutation queue status
    pub sync_status: SyncStatus,
    /// Last local mutation (Unix ms), compared against the remote copy
    pub last_modified_local: i64,
    /// Domain fields; references hold local ids
    pub fields: Fields,
}

impl LocalRecord {
    /// Integer value of a field, if present.
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(serde_json::Value::as_i64)
    }

    /// Text value of a field, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(serde_json::Value::as_str)
    }
}

/// Generate a fresh remote document id.
///
/// UUID v7 keeps ids time-sortable on the remote side.
pub fn new_remote_doc_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
