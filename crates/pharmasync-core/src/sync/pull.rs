//! Pull phase: reconcile a full remote listing into the local table.
//!
//! Writes are not wrapped in a transaction. Reapplying the same listing
//! converges to the same local state, so an interrupted pull heals on the
//! next pass.

use std::collections::HashSet;

use libsql::Connection;
use serde::Serialize;

use super::keys;
use crate::db::{records, LibSqlConflictRepository};
use crate::error::Result;
use crate::models::SyncStatus;
use crate::remote::RemoteDocument;
use crate::schema::EntityDescriptor;

/// Pull outcome for one entity mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// New local rows for documents never seen before
    pub inserted: usize,
    /// Unlinked local rows matched by natural key
    pub linked: usize,
    /// Linked rows replaced by a strictly newer remote version
    pub overwritten: usize,
    pub unchanged: usize,
    /// Local rows whose document disappeared remotely
    pub removed: usize,
    /// Documents that could not be applied this pass
    pub skipped: usize,
    /// Remote versions rejected because the local row is newer
    pub conflicts: usize,
    /// Unlinked local rows with no remote twin, queued for creation
    pub queued: usize,
}

impl PullReport {
    pub const fn changed(&self) -> usize {
        self.inserted + self.linked + self.overwritten + self.removed
    }
}

enum Applied {
    Inserted,
    Linked,
    Overwritten,
    Unchanged,
    Conflict,
}

pub(super) async fn reconcile(
    conn: &Connection,
    entity: &EntityDescriptor,
    documents: &[RemoteDocument],
) -> Result<PullReport> {
    let mut report = PullReport::default();
    let mut listed = HashSet::with_capacity(documents.len());

    for document in documents {
        if document.id.trim().is_empty() {
            tracing::warn!("Skipping {} document without id", entity.remote_collection);
            report.skipped += 1;
            continue;
        }
        listed.insert(document.id.as_str());
        match apply_document(conn, entity, document).await {
            Ok(Applied::Inserted) => report.inserted += 1,
            Ok(Applied::Linked) => report.linked += 1,
            Ok(Applied::Overwritten) => report.overwritten += 1,
            Ok(Applied::Unchanged) => report.unchanged += 1,
            Ok(Applied::Conflict) => report.conflicts += 1,
            Err(err) if err.is_record_level() => {
                tracing::warn!(
                    "Skipping remote {}/{}: {err}",
                    entity.remote_collection,
                    document.id
                );
                report.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    for (local_id, remote_doc_id, status) in records::linked_rows(conn, entity).await? {
        // Queued creates carry a pre-generated id the remote has not seen yet;
        // queued deletes are removed by the push path.
        if listed.contains(remote_doc_id.as_str())
            || matches!(status, SyncStatus::PendingCreate | SyncStatus::PendingDelete)
        {
            continue;
        }
        records::remove(conn, entity, local_id).await?;
        tracing::debug!(
            "Removed {}#{local_id}; {remote_doc_id} was deleted remotely",
            entity.local_table
        );
        report.removed += 1;
    }

    // Whatever is still unlinked after a full listing has no twin to wait for.
    let queued = records::queue_unlinked(conn, entity).await?;
    if !queued.is_empty() {
        tracing::info!(
            "Queued {} unlinked {} rows for creation",
            queued.len(),
            entity.local_table
        );
    }
    report.queued = queued.len();

    Ok(report)
}

async fn apply_document(
    conn: &Connection,
    entity: &EntityDescriptor,
    document: &RemoteDocument,
) -> Result<Applied> {
    let incoming_at = document.modified_at();
    let fields = keys::to_local_fields(conn, entity, &document.fields).await?;

    if let Some(local) = records::find_by_remote_id(conn, entity, &document.id).await? {
        if incoming_at > local.last_modified_local {
            records::write_fields(
                conn,
                entity,
                local.local_id,
                &fields,
                SyncStatus::Synced,
                incoming_at,
            )
            .await?;
            return Ok(Applied::Overwritten);
        }
        if incoming_at < local.last_modified_local {
            let logged = LibSqlConflictRepository::new(conn)
                .record(
                    entity.local_table,
                    &document.id,
                    local.last_modified_local,
                    incoming_at,
                )
                .await?;
            if logged {
                tracing::info!(
                    "Kept local {}#{} over older remote version ({} < {})",
                    entity.local_table,
                    local.local_id,
                    incoming_at,
                    local.last_modified_local
                );
            }
            return Ok(Applied::Conflict);
        }
        return Ok(Applied::Unchanged);
    }

    if let Some(local) = records::find_unlinked_by_natural_key(conn, entity, &fields).await? {
        if records::assign_remote_id(conn, entity, local.local_id, &document.id).await? {
            records::write_fields(
                conn,
                entity,
                local.local_id,
                &fields,
                SyncStatus::Synced,
                incoming_at,
            )
            .await?;
            tracing::debug!(
                "Linked {}#{} to remote {}",
                entity.local_table,
                local.local_id,
                document.id
            );
            return Ok(Applied::Linked);
        }
    }

    records::insert(
        conn,
        entity,
        Some(&document.id),
        SyncStatus::Synced,
        incoming_at,
        &fields,
    )
    .await?;
    Ok(Applied::Inserted)
}
