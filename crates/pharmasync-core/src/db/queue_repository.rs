//! Mutation queue repository: the local write path
//!
//! Every local create, edit and delete lands here. Rows are tagged with a
//! [`SyncStatus`] instead of being copied into a separate outbox, and the sync
//! engine later drains them by status.

use libsql::Connection;

use super::records::{self, StatusCounts};
use crate::error::{Error, Result};
use crate::models::{new_remote_doc_id, Fields, LocalRecord, SyncStatus};
use crate::schema::{self, EntityDescriptor};
use crate::util::now_millis;

/// Trait for local mutation operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Create a row queued as `pending_create` with a pre-generated remote id
    async fn create(&self, entity: &EntityDescriptor, fields: &Fields) -> Result<LocalRecord>;

    /// Merge `patch` into a live row and queue the change
    async fn update(
        &self,
        entity: &EntityDescriptor,
        local_id: i64,
        patch: &Fields,
    ) -> Result<LocalRecord>;

    /// Soft delete a row; it stays until the remote delete is confirmed
    async fn delete(&self, entity: &EntityDescriptor, local_id: i64) -> Result<()>;

    /// Get a live (not pending deletion) row by local id
    async fn get(&self, entity: &EntityDescriptor, local_id: i64) -> Result<Option<LocalRecord>>;

    /// List live rows, oldest first
    async fn list(&self, entity: &EntityDescriptor) -> Result<Vec<LocalRecord>>;

    /// Per-status row counts
    async fn status_counts(&self, entity: &EntityDescriptor) -> Result<StatusCounts>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Every reference must point at a live local row.
    async fn check_references(&self, entity: &EntityDescriptor, fields: &Fields) -> Result<()> {
        for field in entity.fields {
            let Some(table) = field.referenced_table() else {
                continue;
            };
            let Some(local_id) = fields.get(field.name).and_then(serde_json::Value::as_i64) else {
                continue;
            };
            let referenced = schema::entity(table)?;
            let live = records::get(self.conn, referenced, local_id)
                .await?
                .is_some_and(|row| row.sync_status != SyncStatus::PendingDelete);
            if !live {
                return Err(Error::InvalidField {
                    field: field.name.to_string(),
                    reason: format!("no {table} row with local id {local_id}"),
                });
            }
        }
        Ok(())
    }
}

/// Timestamp for a new local version, strictly after the previous one.
fn next_modified(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn create(&self, entity: &EntityDescriptor, fields: &Fields) -> Result<LocalRecord> {
        let fields = entity.validate(fields)?;
        self.check_references(entity, &fields).await?;

        let remote_doc_id = new_remote_doc_id();
        let modified_at = now_millis();
        let local_id = records::insert(
            self.conn,
            entity,
            Some(&remote_doc_id),
            SyncStatus::PendingCreate,
            modified_at,
            &fields,
        )
        .await?;

        tracing::debug!(
            "Queued create {}#{local_id} as {remote_doc_id}",
            entity.local_table
        );

        Ok(LocalRecord {
            local_id,
            remote_doc_id: Some(remote_doc_id),
            sync_status: SyncStatus::PendingCreate,
            last_modified_local: modified_at,
            fields,
        })
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        local_id: i64,
        patch: &Fields,
    ) -> Result<LocalRecord> {
        let current = self
            .get(entity, local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}#{local_id}", entity.local_table)))?;

        let mut merged = current.fields.clone();
        for (name, value) in patch {
            merged.insert(name.clone(), value.clone());
        }
        let merged = entity.validate(&merged)?;
        self.check_references(entity, &merged).await?;

        let status = current.sync_status.after_local_edit();
        let modified_at = next_modified(current.last_modified_local);
        records::write_fields(self.conn, entity, local_id, &merged, status, modified_at).await?;

        tracing::debug!("Queued update {}#{local_id} ({status})", entity.local_table);

        Ok(LocalRecord {
            sync_status: status,
            last_modified_local: modified_at,
            fields: merged,
            ..current
        })
    }

    async fn delete(&self, entity: &EntityDescriptor, local_id: i64) -> Result<()> {
        let current = self
            .get(entity, local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}#{local_id}", entity.local_table)))?;

        records::stamp(
            self.conn,
            entity,
            local_id,
            current.sync_status.after_local_delete(),
            next_modified(current.last_modified_local),
        )
        .await?;

        tracing::debug!("Queued delete {}#{local_id}", entity.local_table);
        Ok(())
    }

    async fn get(&self, entity: &EntityDescriptor, local_id: i64) -> Result<Option<LocalRecord>> {
        Ok(records::get(self.conn, entity, local_id)
            .await?
            .filter(|record| record.sync_status != SyncStatus::PendingDelete))
    }

    async fn list(&self, entity: &EntityDescriptor) -> Result<Vec<LocalRecord>> {
        records::list(self.conn, entity, false).await
    }

    async fn status_counts(&self, entity: &EntityDescriptor) -> Result<StatusCounts> {
        records::status_counts(self.conn, entity).await
    }
}
