//! Push phase: drain the mutation queue of one entity mapping.
//!
//! A push runs in three steps so the store is never locked across a network
//! call. [`plan`] snapshots the queue and translates each row into a remote
//! call, [`send`] performs the calls without touching the store, and
//! [`acknowledge_all`] flips the acknowledged rows inside one transaction.
//! A flip only lands if the row still matches its snapshot, so an edit made
//! while a call was in flight stays queued. Remote calls are idempotent by
//! document id, which makes replaying a lost acknowledgement harmless.

use libsql::Connection;
use serde::Serialize;

use super::keys;
use crate::db::records;
use crate::error::Result;
use crate::models::{new_remote_doc_id, Fields, LocalRecord, SyncStatus};
use crate::remote::RemoteStore;
use crate::schema::EntityDescriptor;

/// Push outcome for one entity mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Rows left pending for the next pass
    pub failed: usize,
    /// The local commit failed; no status flip of this phase persisted
    pub transaction_failed: bool,
}

impl PushReport {
    pub const fn pushed(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

enum Call {
    Create(Fields),
    Update(Fields),
    Delete,
}

/// One remote call prepared from the queue snapshot.
pub(super) struct Outgoing {
    /// The row as it was queued; its acknowledgement is conditional on it
    record: LocalRecord,
    remote_doc_id: String,
    call: Call,
}

/// Translate fields, holding the row when it cannot be sent yet.
async fn remote_fields(
    conn: &Connection,
    entity: &EntityDescriptor,
    record: &LocalRecord,
    report: &mut PushReport,
) -> Result<Option<Fields>> {
    match keys::to_remote_fields(conn, entity, record).await {
        Ok(fields) => Ok(Some(fields)),
        Err(err) if err.is_record_level() => {
            tracing::warn!(
                "Holding {} of {}#{}: {err}",
                record.sync_status,
                entity.local_table,
                record.local_id
            );
            report.failed += 1;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Snapshot the queue, creates first, then updates, then deletes.
///
/// Queue repairs happen here and commit with the caller's transaction: an
/// update that never reached the remote store is requeued as a create under
/// a fresh id, and a delete with no remote id is removed outright.
pub(super) async fn plan(
    conn: &Connection,
    entity: &EntityDescriptor,
) -> Result<(PushReport, Vec<Outgoing>)> {
    let mut report = PushReport::default();
    let mut creates = Vec::new();
    let mut updates = Vec::new();

    for record in records::select_by_status(conn, entity, SyncStatus::PendingCreate).await? {
        let remote_doc_id = match record.remote_doc_id.clone() {
            Some(remote_doc_id) => remote_doc_id,
            None => {
                let remote_doc_id = new_remote_doc_id();
                records::assign_remote_id(conn, entity, record.local_id, &remote_doc_id).await?;
                remote_doc_id
            }
        };
        creates.push((record, remote_doc_id));
    }

    for mut record in records::select_by_status(conn, entity, SyncStatus::PendingUpdate).await? {
        if let Some(remote_doc_id) = record.remote_doc_id.clone() {
            updates.push((record, remote_doc_id));
            continue;
        }

        // Never reached the remote store: create it instead. The new id is
        // kept even if the create fails, so the retry stays idempotent.
        let remote_doc_id = new_remote_doc_id();
        records::assign_remote_id(conn, entity, record.local_id, &remote_doc_id).await?;
        records::set_status(conn, entity, record.local_id, SyncStatus::PendingCreate).await?;
        tracing::debug!(
            "Requeued {}#{} as a create under {remote_doc_id}",
            entity.local_table,
            record.local_id
        );
        record.remote_doc_id = Some(remote_doc_id.clone());
        record.sync_status = SyncStatus::PendingCreate;
        creates.push((record, remote_doc_id));
    }

    let mut planned = Vec::with_capacity(creates.len() + updates.len());
    for (record, remote_doc_id) in creates {
        if let Some(fields) = remote_fields(conn, entity, &record, &mut report).await? {
            planned.push(Outgoing {
                record,
                remote_doc_id,
                call: Call::Create(fields),
            });
        }
    }
    for (record, remote_doc_id) in updates {
        if let Some(fields) = remote_fields(conn, entity, &record, &mut report).await? {
            planned.push(Outgoing {
                record,
                remote_doc_id,
                call: Call::Update(fields),
            });
        }
    }

    for record in records::select_by_status(conn, entity, SyncStatus::PendingDelete).await? {
        let Some(remote_doc_id) = record.remote_doc_id.clone() else {
            // Nothing to delete remotely.
            records::remove(conn, entity, record.local_id).await?;
            report.deleted += 1;
            continue;
        };
        planned.push(Outgoing {
            record,
            remote_doc_id,
            call: Call::Delete,
        });
    }

    Ok((report, planned))
}

/// Perform the planned calls, returning the snapshots the remote accepted.
///
/// A failed call leaves its row queued; its siblings still go out.
pub(super) async fn send<R: RemoteStore>(
    remote: &R,
    entity: &EntityDescriptor,
    outgoing: Vec<Outgoing>,
    report: &mut PushReport,
) -> Vec<LocalRecord> {
    let collection = entity.remote_collection;
    let mut accepted = Vec::with_capacity(outgoing.len());

    for Outgoing {
        record,
        remote_doc_id,
        call,
    } in outgoing
    {
        let (verb, result) = match &call {
            Call::Create(fields) => (
                "create",
                remote.create_with_id(collection, &remote_doc_id, fields).await,
            ),
            Call::Update(fields) => (
                "update",
                remote.update_fields(collection, &remote_doc_id, fields).await,
            ),
            Call::Delete => ("delete", remote.delete_by_id(collection, &remote_doc_id).await),
        };

        match result {
            Ok(()) => {
                match call {
                    Call::Create(_) => report.created += 1,
                    Call::Update(_) => report.updated += 1,
                    Call::Delete => report.deleted += 1,
                }
                accepted.push(record);
            }
            Err(err) => {
                tracing::warn!("Remote {verb} of {collection}/{remote_doc_id} failed: {err}");
                report.failed += 1;
            }
        }
    }

    accepted
}

/// Apply the statuses the remote acknowledgements imply.
///
/// Rows changed since their snapshot are left queued for the next pass.
pub(super) async fn acknowledge_all(
    conn: &Connection,
    entity: &EntityDescriptor,
    accepted: &[LocalRecord],
) -> Result<()> {
    for record in accepted {
        if !records::acknowledge(conn, entity, record).await? {
            tracing::debug!(
                "{}#{} changed during push; left queued",
                entity.local_table,
                record.local_id
            );
        }
    }
    Ok(())
}
