//! Stock derivation
//!
//! On-hand quantity is never stored. It is folded at read time from four
//! append-only ledgers: receipts, issuance lines, returns and adjustments.
//! Rows waiting for remote deletion no longer count.

use std::collections::HashMap;

use libsql::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{records, LibSqlQueueRepository, QueueRepository};
use crate::error::{Error, Result};
use crate::models::{Fields, LocalRecord, SyncStatus};
use crate::schema::{
    ISSUANCES, ISSUANCE_LINES, MEDICATIONS, STOCK_ADJUSTMENTS, STOCK_RECEIPTS, STOCK_RETURNS,
};

/// Ledger totals for one medication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub medication_id: i64,
    pub received: i64,
    pub issued: i64,
    pub returned: i64,
    /// Signed sum of manual adjustments
    pub adjusted: i64,
}

impl StockLevel {
    pub const fn on_hand(&self) -> i64 {
        self.received - self.issued + self.returned + self.adjusted
    }
}

/// A catalog medication with its derived stock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicationStock {
    pub medication: LocalRecord,
    pub level: StockLevel,
}

impl MedicationStock {
    pub fn name(&self) -> &str {
        self.medication.text("name").unwrap_or_default()
    }

    pub fn reorder_level(&self) -> Option<i64> {
        self.medication.integer("reorder_level")
    }

    /// At or below the reorder level; never true without one.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_level()
            .is_some_and(|level| self.level.on_hand() <= level)
    }
}

/// One line of an issuance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceLine {
    pub medication_id: i64,
    pub quantity: i64,
}

const LEDGER_TABLES: [&str; 4] = [
    STOCK_RECEIPTS.local_table,
    ISSUANCE_LINES.local_table,
    STOCK_RETURNS.local_table,
    STOCK_ADJUSTMENTS.local_table,
];

fn apply_total(level: &mut StockLevel, ledger: &str, total: i64) {
    match ledger {
        "stock_receipts" => level.received = total,
        "issuance_lines" => level.issued = total,
        "stock_returns" => level.returned = total,
        _ => level.adjusted = total,
    }
}

async fn ledger_total(conn: &Connection, ledger: &str, medication_id: i64) -> Result<i64> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT COALESCE(SUM(quantity), 0) FROM {ledger}
                 WHERE medication_id = ?1 AND sync_status != ?2"
            ),
            libsql::params![medication_id, SyncStatus::PendingDelete.as_str()],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}

async fn ledger_totals(conn: &Connection, ledger: &str) -> Result<HashMap<i64, i64>> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT medication_id, SUM(quantity) FROM {ledger}
                 WHERE sync_status != ?1
                 GROUP BY medication_id"
            ),
            libsql::params![SyncStatus::PendingDelete.as_str()],
        )
        .await?;

    let mut totals = HashMap::new();
    while let Some(row) = rows.next().await? {
        totals.insert(row.get::<i64>(0)?, row.get::<i64>(1)?);
    }
    Ok(totals)
}

/// Derive the stock of one medication.
pub async fn stock_level(conn: &Connection, medication_id: i64) -> Result<StockLevel> {
    let mut level = StockLevel {
        medication_id,
        ..StockLevel::default()
    };
    for ledger in LEDGER_TABLES {
        let total = ledger_total(conn, ledger, medication_id).await?;
        apply_total(&mut level, ledger, total);
    }
    Ok(level)
}

/// Derive the stock of every live catalog medication.
pub async fn stock_levels(conn: &Connection) -> Result<Vec<MedicationStock>> {
    let mut totals = Vec::with_capacity(LEDGER_TABLES.len());
    for ledger in LEDGER_TABLES {
        totals.push((ledger, ledger_totals(conn, ledger).await?));
    }

    let medications = records::list(conn, &MEDICATIONS, false).await?;
    Ok(medications
        .into_iter()
        .map(|medication| {
            let mut level = StockLevel {
                medication_id: medication.local_id,
                ..StockLevel::default()
            };
            for (ledger, ledger_totals) in &totals {
                let total = ledger_totals
                    .get(&medication.local_id)
                    .copied()
                    .unwrap_or_default();
                apply_total(&mut level, ledger, total);
            }
            MedicationStock { medication, level }
        })
        .collect())
}

/// Medications whose on-hand stock is at or below their reorder level.
pub async fn below_reorder_level(conn: &Connection) -> Result<Vec<MedicationStock>> {
    Ok(stock_levels(conn)
        .await?
        .into_iter()
        .filter(MedicationStock::needs_reorder)
        .collect())
}

/// Queue an issuance and its lines.
///
/// Every line is checked against the stock derived so far, earlier lines of
/// the same issuance included. Run it inside a transaction so a failing line
/// leaves nothing behind.
pub async fn issue(
    conn: &Connection,
    issuance: &Fields,
    lines: &[IssuanceLine],
) -> Result<(LocalRecord, Vec<LocalRecord>)> {
    if lines.is_empty() {
        return Err(Error::InvalidInput(
            "an issuance needs at least one line".to_string(),
        ));
    }

    let repo = LibSqlQueueRepository::new(conn);
    let header = repo.create(&ISSUANCES, issuance).await?;

    let mut created = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(Error::InvalidField {
                field: "quantity".to_string(),
                reason: format!("issued quantity must be positive, got {}", line.quantity),
            });
        }
        let available = stock_level(conn, line.medication_id).await?.on_hand();
        if line.quantity > available {
            return Err(Error::InsufficientStock {
                medication_id: line.medication_id,
                available,
                requested: line.quantity,
            });
        }

        let mut fields = Fields::new();
        fields.insert("issuance_id".to_string(), header.local_id.into());
        fields.insert("medication_id".to_string(), line.medication_id.into());
        fields.insert("quantity".to_string(), line.quantity.into());
        created.push(repo.create(&ISSUANCE_LINES, &fields).await?);
    }

    tracing::debug!(
        "Queued issuance #{} with {} lines",
        header.local_id,
        created.len()
    );
    Ok((header, created))
}
