//! Remote document store adapters.
//!
//! The sync engine only needs four calls per collection. Each call may fail on
//! its own; the engine decides whether a failure is per-row or fatal.

mod http;
mod memory;

use serde::{Deserialize, Serialize};

pub use http::HttpRemoteStore;
pub use memory::{FailureRule, MemoryRemoteStore, RemoteOp};

use crate::models::Fields;
use crate::schema::MODIFIED_FIELD;
use crate::Result;

/// A document as stored remotely: its id plus flat fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Modification timestamp carried by the document; missing counts as 0.
    #[allow(clippy::cast_possible_truncation)]
    pub fn modified_at(&self) -> i64 {
        self.fields.get(MODIFIED_FIELD).map_or(0, |value| {
            value
                .as_i64()
                .or_else(|| value.as_f64().map(|number| number as i64))
                .unwrap_or(0)
        })
    }
}

/// Contract over a remote document collection store (async)
///
/// Creates and deletes must be idempotent by id: a create overwrites an
/// existing document with the same id, and deleting a missing id succeeds.
/// The engine relies on this to retry after a crash between a remote success
/// and the local commit.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Fetch every document of a collection
    async fn list_all(&self, collection: &str) -> Result<Vec<RemoteDocument>>;

    /// Create (or replace) the document with the given id
    async fn create_with_id(&self, collection: &str, id: &str, fields: &Fields) -> Result<()>;

    /// Merge fields into an existing document
    async fn update_fields(&self, collection: &str, id: &str, fields: &Fields) -> Result<()>;

    /// Delete a document by id
    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<()>;
}
