//! Bidirectional sync between the local store and a remote document store.
//!
//! A pass walks the entity mappings in declared order. For each mapping the
//! mutation queue is pushed, then the full remote collection is pulled and
//! reconciled. The store lock is only held while reading or writing local
//! rows, never across a remote call, so local writes keep flowing during a
//! pass. A failed push commit is logged and the pass moves on; a failed
//! remote listing aborts the pass, leaving mappings already processed
//! committed.

mod keys;
mod pull;
mod push;
mod scheduler;
#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;

pub use pull::PullReport;
pub use push::PushReport;
pub use scheduler::{SyncScheduler, SyncTrigger};

use crate::error::Result;
use crate::remote::RemoteStore;
use crate::schema::{EntityDescriptor, ENTITY_MAPPINGS};
use crate::services::LocalStore;
use crate::state::SyncState;

/// Result of one entity mapping within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: &'static str,
    pub push: PushReport,
    pub pull: PullReport,
}

/// Result of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub entities: Vec<EntityReport>,
}

impl SyncReport {
    pub fn entity(&self, local_table: &str) -> Option<&EntityReport> {
        self.entities
            .iter()
            .find(|report| report.entity == local_table)
    }

    pub fn pushed(&self) -> usize {
        self.entities.iter().map(|report| report.push.pushed()).sum()
    }

    pub fn pulled(&self) -> usize {
        self.entities.iter().map(|report| report.pull.changed()).sum()
    }

    /// Rows that stayed queued because their remote call failed.
    pub fn failed(&self) -> usize {
        self.entities.iter().map(|report| report.push.failed).sum()
    }
}

/// Outcome of a sync trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was already running; the trigger was dropped.
    Skipped,
}

/// Clears the running flag when a pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sync orchestrator
pub struct SyncEngine<R> {
    store: LocalStore,
    remote: R,
    mappings: &'static [EntityDescriptor],
    running: AtomicBool,
    state: watch::Sender<SyncState>,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Create an engine over every declared entity mapping.
    pub fn new(store: LocalStore, remote: R) -> Self {
        Self::with_mappings(store, remote, ENTITY_MAPPINGS)
    }

    /// Create an engine over a subset of mappings, processed in the given order.
    pub fn with_mappings(
        store: LocalStore,
        remote: R,
        mappings: &'static [EntityDescriptor],
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            store,
            remote,
            mappings,
            running: AtomicBool::new(false),
            state,
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Current indicator value.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch the indicator.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn mark_offline(&self) {
        self.state.send_replace(SyncState::Offline);
    }

    /// Run one pass unless one is already in progress.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let Some(_running) = RunningGuard::acquire(&self.running) else {
            tracing::debug!("Sync already in progress; dropping trigger");
            return Ok(SyncOutcome::Skipped);
        };

        self.state.send_replace(SyncState::Syncing);
        match self.run_pass().await {
            Ok(report) => {
                self.state.send_replace(SyncState::Synced);
                tracing::info!(
                    "Sync pass complete: {} pushed, {} pulled, {} still queued",
                    report.pushed(),
                    report.pulled(),
                    report.failed()
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                self.state.send_replace(SyncState::Error);
                tracing::error!("Sync pass failed: {err}");
                Err(err)
            }
        }
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for entity in self.mappings {
            let push = self.push(entity).await;
            let pull = self.pull(entity).await?;
            tracing::debug!(
                "{}: pushed {}, pulled {}, skipped {}",
                entity.local_table,
                push.pushed(),
                pull.changed(),
                pull.skipped
            );
            report.entities.push(EntityReport {
                entity: entity.local_table,
                push,
                pull,
            });
        }
        Ok(report)
    }

    async fn push(&self, entity: &EntityDescriptor) -> PushReport {
        self.try_push(entity).await.unwrap_or_else(|err| {
            tracing::error!("Push of {} rolled back: {err}", entity.local_table);
            PushReport {
                transaction_failed: true,
                ..PushReport::default()
            }
        })
    }

    /// Plan under the store lock, call the remote without it, then apply
    /// every acknowledgement in one short transaction.
    async fn try_push(&self, entity: &EntityDescriptor) -> Result<PushReport> {
        let (mut report, outgoing) = {
            let db = self.store.lock().await;
            let tx = db.transaction().await?;
            let planned = push::plan(&tx, entity).await?;
            tx.commit().await?;
            planned
        };
        if outgoing.is_empty() {
            return Ok(report);
        }

        let accepted = push::send(&self.remote, entity, outgoing, &mut report).await;

        let db = self.store.lock().await;
        let tx = db.transaction().await?;
        push::acknowledge_all(&tx, entity, &accepted).await?;
        tx.commit().await?;
        Ok(report)
    }

    async fn pull(&self, entity: &EntityDescriptor) -> Result<PullReport> {
        let documents = self.remote.list_all(entity.remote_collection).await?;
        let db = self.store.lock().await;
        pull::reconcile(db.connection(), entity, &documents).await
    }
}
