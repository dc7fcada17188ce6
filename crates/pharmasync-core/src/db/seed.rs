//! Bundled seed data
//!
//! A seed is a JSON document mapping local table names to rows:
//!
//! ```json
//! { "medications": [ { "name": "Paracetamol 500mg", "unit": "tablet" } ] }
//! ```
//!
//! Seeded rows are `synced`, carry no remote id and a zero timestamp, so the
//! first pull links them to their remote twins by natural key and adopts the
//! remote version. Rows the remote store has no twin for are then queued as
//! creates.

use std::collections::BTreeMap;
use std::path::Path;

use libsql::Connection;
use serde::Deserialize;

use super::records;
use crate::error::{Error, Result};
use crate::models::{Fields, SyncStatus};
use crate::schema::{self, ENTITY_MAPPINGS};

/// Parsed seed document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Seed {
    tables: BTreeMap<String, Vec<Fields>>,
}

impl Seed {
    /// Parse a seed from a JSON payload
    pub fn parse(payload: &str) -> Result<Self> {
        let seed: Self = serde_json::from_str(payload)?;
        for (table, rows) in &seed.tables {
            let entity = schema::entity(table)?;
            if let Some(field) = entity.fields.iter().find(|f| f.referenced_table().is_some()) {
                return Err(Error::InvalidInput(format!(
                    "seed rows for {table} cannot carry reference field {}",
                    field.name
                )));
            }
            for row in rows {
                entity.validate(row)?;
            }
        }
        Ok(seed)
    }

    /// Load a seed file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Insert seed rows into tables that are still empty.
    ///
    /// Returns the number of inserted rows.
    pub async fn apply(&self, conn: &Connection) -> Result<usize> {
        let mut inserted = 0;
        // Declared mapping order, not map order.
        for entity in ENTITY_MAPPINGS {
            let Some(rows) = self.tables.get(entity.local_table) else {
                continue;
            };
            if !records::is_empty(conn, entity).await? {
                tracing::debug!("Skipping seed for non-empty {}", entity.local_table);
                continue;
            }
            for row in rows {
                let fields = entity.validate(row)?;
                records::insert(conn, entity, None, SyncStatus::Synced, 0, &fields).await?;
                inserted += 1;
            }
        }

        if inserted > 0 {
            tracing::info!("Seeded {inserted} rows into the local store");
        }
        Ok(inserted)
    }
}
