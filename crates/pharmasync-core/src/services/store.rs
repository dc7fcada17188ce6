//! Shared local store service used across clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::db::{
    records, Database, LibSqlConflictRepository, LibSqlQueueRepository, QueueRepository, Seed,
    StatusCounts,
};
use crate::models::{Fields, LocalRecord, SyncConflict};
use crate::schema::{EntityDescriptor, ENTITY_MAPPINGS};
use crate::stock::{self, IssuanceLine, MedicationStock, StockLevel};
use crate::Result;

/// Thread-safe handle on the local store.
///
/// Created once at startup and passed to the sync engine and every client;
/// clones share the same connection.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and the store is rebuilt
    /// from the bundled schema.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is unreadable: {}. Rebuilding it.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, if file backed.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database")
            || message.contains("database disk image is malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local store from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        // -wal, -shm and friends belong to the quarantined file.
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale local store file {}", path.display());
            }
        }

        Ok(())
    }

    /// Apply seed data to tables that are still empty.
    pub async fn apply_seed(&self, seed: &Seed) -> Result<usize> {
        let db = self.db.lock().await;
        seed.apply(db.connection()).await
    }

    /// Queue a new row.
    pub async fn create_record(
        &self,
        entity: &EntityDescriptor,
        fields: &Fields,
    ) -> Result<LocalRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.create(entity, fields).await
    }

    /// Queue an edit of a live row.
    pub async fn update_record(
        &self,
        entity: &EntityDescriptor,
        local_id: i64,
        patch: &Fields,
    ) -> Result<LocalRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.update(entity, local_id, patch).await
    }

    /// Queue a delete of a live row.
    pub async fn delete_record(&self, entity: &EntityDescriptor, local_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.delete(entity, local_id).await
    }

    /// Fetch a live row.
    pub async fn get_record(
        &self,
        entity: &EntityDescriptor,
        local_id: i64,
    ) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.get(entity, local_id).await
    }

    /// List live rows.
    pub async fn list_records(&self, entity: &EntityDescriptor) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.list(entity).await
    }

    /// Queue an issuance and its lines as one unit.
    pub async fn record_issuance(
        &self,
        issuance: &Fields,
        lines: &[IssuanceLine],
    ) -> Result<(LocalRecord, Vec<LocalRecord>)> {
        let db = self.db.lock().await;
        let tx = db.transaction().await?;
        let created = stock::issue(&tx, issuance, lines).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Row counts per status for every entity mapping, in sync order.
    pub async fn status_summary(&self) -> Result<Vec<(&'static str, StatusCounts)>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let mut summary = Vec::with_capacity(ENTITY_MAPPINGS.len());
        for entity in ENTITY_MAPPINGS {
            summary.push((entity.local_table, repo.status_counts(entity).await?));
        }
        Ok(summary)
    }

    /// Derived stock for one medication.
    pub async fn stock_level(&self, medication_id: i64) -> Result<StockLevel> {
        let db = self.db.lock().await;
        stock::stock_level(db.connection(), medication_id).await
    }

    /// Derived stock for every catalog medication.
    pub async fn stock_levels(&self) -> Result<Vec<MedicationStock>> {
        let db = self.db.lock().await;
        stock::stock_levels(db.connection()).await
    }

    /// Medications at or below their reorder level.
    pub async fn below_reorder_level(&self) -> Result<Vec<MedicationStock>> {
        let db = self.db.lock().await;
        stock::below_reorder_level(db.connection()).await
    }

    /// List recently logged sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let repo = LibSqlConflictRepository::new(db.connection());
        repo.list(limit).await
    }

    /// Find the row linked to a remote document, whatever its status.
    pub async fn find_by_remote_id(
        &self,
        entity: &EntityDescriptor,
        remote_doc_id: &str,
    ) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        records::find_by_remote_id(db.connection(), entity, remote_doc_id).await
    }
}
