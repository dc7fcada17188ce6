//! Database migrations
//!
//! The migrations are the bundled schema: a store that cannot be loaded is
//! rebuilt from them.

use crate::error::Result;
use libsql::Connection;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a batch of statements atomically
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            libsql::params![version],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: syncable entity tables
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Medication catalog
            "CREATE TABLE IF NOT EXISTS medications (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                name TEXT NOT NULL,
                category TEXT,
                unit TEXT,
                unit_price REAL,
                reorder_level INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_medications_sync_status ON medications(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(name)",
            // Patients
            "CREATE TABLE IF NOT EXISTS patients (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                birth_date TEXT,
                phone TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_patients_sync_status ON patients(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(last_name, first_name)",
            // Stock receipts ledger
            "CREATE TABLE IF NOT EXISTS stock_receipts (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                medication_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                received_at INTEGER NOT NULL,
                supplier TEXT,
                batch_number TEXT,
                expiry_date TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_stock_receipts_sync_status ON stock_receipts(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_stock_receipts_medication ON stock_receipts(medication_id)",
            // Issuances and their lines
            "CREATE TABLE IF NOT EXISTS issuances (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                patient_id INTEGER,
                issued_at INTEGER NOT NULL,
                prescriber TEXT,
                note TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_issuances_sync_status ON issuances(sync_status)",
            "CREATE TABLE IF NOT EXISTS issuance_lines (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                issuance_id INTEGER NOT NULL,
                medication_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_issuance_lines_sync_status ON issuance_lines(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_issuance_lines_medication ON issuance_lines(medication_id)",
            "CREATE INDEX IF NOT EXISTS idx_issuance_lines_issuance ON issuance_lines(issuance_id)",
            // Returns ledger
            "CREATE TABLE IF NOT EXISTS stock_returns (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                medication_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                returned_at INTEGER NOT NULL,
                reason TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_stock_returns_sync_status ON stock_returns(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_stock_returns_medication ON stock_returns(medication_id)",
            // Manual adjustments ledger (signed quantities)
            "CREATE TABLE IF NOT EXISTS stock_adjustments (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_doc_id TEXT UNIQUE,
                sync_status TEXT NOT NULL DEFAULT 'pending_create'
                    CHECK (sync_status IN ('pending_create', 'pending_update', 'pending_delete', 'synced')),
                last_modified_local INTEGER NOT NULL,
                medication_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                adjusted_at INTEGER NOT NULL,
                reason TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_stock_adjustments_sync_status ON stock_adjustments(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_stock_adjustments_medication ON stock_adjustments(medication_id)",
        ],
    )
    .await
}

/// Migration to version 2: LWW conflict logging
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS sync_conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity TEXT NOT NULL,
                remote_doc_id TEXT NOT NULL,
                local_modified_at INTEGER NOT NULL,
                incoming_modified_at INTEGER NOT NULL,
                resolved_at INTEGER NOT NULL,
                strategy TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_remote_doc_id ON sync_conflicts(remote_doc_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
        ],
    )
    .await
}
