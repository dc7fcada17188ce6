//! Sync conflict log repository

use libsql::Connection;

use crate::error::Result;
use crate::models::SyncConflict;
use crate::util::now_millis;

/// Strategy label written for last-write-wins resolutions
pub const LWW_STRATEGY: &str = "lww";

/// libSQL access to the `sync_conflicts` table
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a remote version that lost to a newer local one
    ///
    /// A pending local edit keeps losing against the same remote version on
    /// every pass until it is pushed; that version is logged once. Returns
    /// whether a row was written.
    pub async fn record(
        &self,
        entity: &str,
        remote_doc_id: &str,
        local_modified_at: i64,
        incoming_modified_at: i64,
    ) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO sync_conflicts (
                    entity, remote_doc_id, local_modified_at,
                    incoming_modified_at, resolved_at, strategy
                 )
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE NOT EXISTS (
                    SELECT 1 FROM sync_conflicts
                    WHERE entity = ?1 AND remote_doc_id = ?2 AND incoming_modified_at = ?4
                 )",
                libsql::params![
                    entity,
                    remote_doc_id,
                    local_modified_at,
                    incoming_modified_at,
                    now_millis(),
                    LWW_STRATEGY
                ],
            )
            .await?;
        Ok(inserted > 0)
    }

    /// List recently resolved conflicts, newest first
    pub async fn list(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity, remote_doc_id, local_modified_at,
                        incoming_modified_at, resolved_at, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?1",
                libsql::params![limit],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                entity: row.get(1)?,
                remote_doc_id: row.get(2)?,
                local_modified_at: row.get(3)?,
                incoming_modified_at: row.get(4)?,
                resolved_at: row.get(5)?,
                strategy: row.get(6)?,
            });
        }
        Ok(conflicts)
    }
}
