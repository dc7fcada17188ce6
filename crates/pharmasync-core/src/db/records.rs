//! Row-level access to syncable tables
//!
//! Every function works against any [`EntityDescriptor`] and takes a plain
//! connection, so the same code runs inside a push transaction
//! (`Transaction` derefs to `Connection`) or directly during pull.
//! Table and column names come from the static descriptors only.

use libsql::params::Params;
use libsql::{Connection, Row, Value as SqlValue};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{new_remote_doc_id, Fields, LocalRecord, SyncStatus};
use crate::schema::{EntityDescriptor, SYNC_COLUMNS};

/// Per-status row counts for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending_create: usize,
    pub pending_update: usize,
    pub pending_delete: usize,
    pub synced: usize,
}

impl StatusCounts {
    /// Rows still waiting for the remote store.
    pub const fn pending(&self) -> usize {
        self.pending_create + self.pending_update + self.pending_delete
    }
}

fn text_value(value: SqlValue, column: &str) -> Result<Option<String>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "column {column} holds {other:?}, expected text"
        ))),
    }
}

fn integer_value(value: SqlValue, column: &str) -> Result<i64> {
    match value {
        SqlValue::Integer(number) => Ok(number),
        other => Err(Error::Database(format!(
            "column {column} holds {other:?}, expected integer"
        ))),
    }
}

/// Parse a row selected with [`EntityDescriptor::select_columns`].
pub fn parse_record(entity: &EntityDescriptor, row: &Row) -> Result<LocalRecord> {
    let local_id = integer_value(row.get_value(0)?, "local_id")?;
    let remote_doc_id = text_value(row.get_value(1)?, "remote_doc_id")?;
    let sync_status = text_value(row.get_value(2)?, "sync_status")?
        .ok_or_else(|| Error::Database("sync_status is null".to_string()))?
        .parse()?;
    let last_modified_local = integer_value(row.get_value(3)?, "last_modified_local")?;

    let mut fields = Fields::new();
    for (offset, field) in entity.fields.iter().enumerate() {
        let index = i32::try_from(SYNC_COLUMNS.len() + offset)
            .map_err(|_| Error::Database("too many columns".to_string()))?;
        fields.insert(field.name.to_string(), field.from_sql(row.get_value(index)?)?);
    }

    Ok(LocalRecord {
        local_id,
        remote_doc_id,
        sync_status,
        last_modified_local,
        fields,
    })
}

async fn select(
    conn: &Connection,
    entity: &EntityDescriptor,
    filter: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<LocalRecord>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {filter} ORDER BY local_id",
        entity.select_columns(),
        entity.local_table
    );
    let mut rows = conn.query(&sql, Params::Positional(params)).await?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        records.push(parse_record(entity, &row)?);
    }
    Ok(records)
}

fn domain_params(entity: &EntityDescriptor, fields: &Fields) -> Result<Vec<SqlValue>> {
    entity
        .fields
        .iter()
        .map(|field| field.to_sql(fields.get(field.name).unwrap_or(&serde_json::Value::Null)))
        .collect()
}

/// Get a row by local id, whatever its status.
pub async fn get(
    conn: &Connection,
    entity: &EntityDescriptor,
    local_id: i64,
) -> Result<Option<LocalRecord>> {
    Ok(select(conn, entity, "local_id = ?1", vec![SqlValue::Integer(local_id)])
        .await?
        .into_iter()
        .next())
}

/// List rows; rows awaiting deletion are hidden unless asked for.
pub async fn list(
    conn: &Connection,
    entity: &EntityDescriptor,
    include_pending_delete: bool,
) -> Result<Vec<LocalRecord>> {
    if include_pending_delete {
        select(conn, entity, "1 = 1", Vec::new()).await
    } else {
        select(
            conn,
            entity,
            "sync_status != ?1",
            vec![SqlValue::Text(SyncStatus::PendingDelete.as_str().to_string())],
        )
        .await
    }
}

/// Select the mutation queue for one status, oldest first.
pub async fn select_by_status(
    conn: &Connection,
    entity: &EntityDescriptor,
    status: SyncStatus,
) -> Result<Vec<LocalRecord>> {
    select(
        conn,
        entity,
        "sync_status = ?1",
        vec![SqlValue::Text(status.as_str().to_string())],
    )
    .await
}

/// Find the row linked to a remote document.
pub async fn find_by_remote_id(
    conn: &Connection,
    entity: &EntityDescriptor,
    remote_doc_id: &str,
) -> Result<Option<LocalRecord>> {
    Ok(select(
        conn,
        entity,
        "remote_doc_id = ?1",
        vec![SqlValue::Text(remote_doc_id.to_string())],
    )
    .await?
    .into_iter()
    .next())
}

/// Find a row without a remote id whose natural key equals the given fields.
pub async fn find_unlinked_by_natural_key(
    conn: &Connection,
    entity: &EntityDescriptor,
    fields: &Fields,
) -> Result<Option<LocalRecord>> {
    let Some(values) = entity.natural_key_values(fields) else {
        return Ok(None);
    };

    let mut filter = String::from("remote_doc_id IS NULL");
    let mut params = Vec::with_capacity(values.len());
    for (position, (name, value)) in entity.natural_key.iter().zip(values).enumerate() {
        let field = entity
            .field(name)
            .ok_or_else(|| Error::UnknownEntity(format!("{}.{name}", entity.local_table)))?;
        filter.push_str(&format!(" AND {name} = ?{}", position + 1));
        params.push(field.to_sql(&value)?);
    }

    Ok(select(conn, entity, &filter, params)
        .await?
        .into_iter()
        .next())
}

/// Insert a row, returning its local id.
pub async fn insert(
    conn: &Connection,
    entity: &EntityDescriptor,
    remote_doc_id: Option<&str>,
    status: SyncStatus,
    modified_at: i64,
    fields: &Fields,
) -> Result<i64> {
    let columns = entity.select_columns();
    let column_count = SYNC_COLUMNS.len() - 1 + entity.fields.len();
    let placeholders = (1..=column_count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    // Skip local_id; SQLite assigns it.
    let columns = columns.trim_start_matches("local_id, ");
    let sql = format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        entity.local_table
    );

    let mut params = vec![
        remote_doc_id.map_or(SqlValue::Null, |id| SqlValue::Text(id.to_string())),
        SqlValue::Text(status.as_str().to_string()),
        SqlValue::Integer(modified_at),
    ];
    params.extend(domain_params(entity, fields)?);

    conn.execute(&sql, Params::Positional(params)).await?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite domain fields, status and timestamp of a row.
pub async fn write_fields(
    conn: &Connection,
    entity: &EntityDescriptor,
    local_id: i64,
    fields: &Fields,
    status: SyncStatus,
    modified_at: i64,
) -> Result<()> {
    let assignments = entity
        .fields
        .iter()
        .enumerate()
        .map(|(offset, field)| format!("{} = ?{}", field.name, offset + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET sync_status = ?1, last_modified_local = ?2, {assignments} \
         WHERE local_id = ?{}",
        entity.local_table,
        entity.fields.len() + 3
    );

    let mut params = vec![
        SqlValue::Text(status.as_str().to_string()),
        SqlValue::Integer(modified_at),
    ];
    params.extend(domain_params(entity, fields)?);
    params.push(SqlValue::Integer(local_id));

    let affected = conn.execute(&sql, Params::Positional(params)).await?;
    if affected == 0 {
        return Err(Error::NotFound(format!("{}#{local_id}", entity.local_table)));
    }
    Ok(())
}

/// Set only the status of a row.
pub async fn set_status(
    conn: &Connection,
    entity: &EntityDescriptor,
    local_id: i64,
    status: SyncStatus,
) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET sync_status = ?1 WHERE local_id = ?2",
            entity.local_table
        ),
        libsql::params![status.as_str(), local_id],
    )
    .await?;
    Ok(())
}

/// Set status and timestamp of a row, leaving its fields alone.
pub async fn stamp(
    conn: &Connection,
    entity: &EntityDescriptor,
    local_id: i64,
    status: SyncStatus,
    modified_at: i64,
) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET sync_status = ?1, last_modified_local = ?2 WHERE local_id = ?3",
            entity.local_table
        ),
        libsql::params![status.as_str(), modified_at, local_id],
    )
    .await?;
    Ok(())
}

/// Attach a remote id to a row that has none.
///
/// Returns false when the row already carries a remote id; a linked id is
/// never reassigned.
pub async fn assign_remote_id(
    conn: &Connection,
    entity: &EntityDescriptor,
    local_id: i64,
    remote_doc_id: &str,
) -> Result<bool> {
    let affected = conn
        .execute(
            &format!(
                "UPDATE {} SET remote_doc_id = ?1 WHERE local_id = ?2 AND remote_doc_id IS NULL",
                entity.local_table
            ),
            libsql::params![remote_doc_id, local_id],
        )
        .await?;
    Ok(affected > 0)
}

/// Apply a remote acknowledgement unless the row changed since `snapshot`.
///
/// The status flip (or removal, for deletes) only matches a row still
/// holding the snapshot's status and timestamp. Returns false otherwise.
pub async fn acknowledge(
    conn: &Connection,
    entity: &EntityDescriptor,
    snapshot: &LocalRecord,
) -> Result<bool> {
    let guard = "local_id = ?1 AND sync_status = ?2 AND last_modified_local = ?3";
    let mut params = vec![
        SqlValue::Integer(snapshot.local_id),
        SqlValue::Text(snapshot.sync_status.as_str().to_string()),
        SqlValue::Integer(snapshot.last_modified_local),
    ];
    let sql = match snapshot.sync_status.after_remote_ack() {
        Some(status) => {
            params.push(SqlValue::Text(status.as_str().to_string()));
            format!("UPDATE {} SET sync_status = ?4 WHERE {guard}", entity.local_table)
        }
        None => format!("DELETE FROM {} WHERE {guard}", entity.local_table),
    };

    let affected = conn.execute(&sql, Params::Positional(params)).await?;
    Ok(affected > 0)
}

/// Queue `synced` rows that never got a remote id as creates.
///
/// Seeded rows start out this way; once a full listing has offered no twin
/// to link them to, they are pushed under a fresh id. Returns the local ids.
pub async fn queue_unlinked(conn: &Connection, entity: &EntityDescriptor) -> Result<Vec<i64>> {
    let unlinked = select(
        conn,
        entity,
        "remote_doc_id IS NULL AND sync_status = ?1",
        vec![SqlValue::Text(SyncStatus::Synced.as_str().to_string())],
    )
    .await?;

    let mut queued = Vec::with_capacity(unlinked.len());
    for record in unlinked {
        if assign_remote_id(conn, entity, record.local_id, &new_remote_doc_id()).await? {
            set_status(conn, entity, record.local_id, SyncStatus::PendingCreate).await?;
            queued.push(record.local_id);
        }
    }
    Ok(queued)
}

/// Physically remove a row.
pub async fn remove(conn: &Connection, entity: &EntityDescriptor, local_id: i64) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE local_id = ?1", entity.local_table),
        libsql::params![local_id],
    )
    .await?;
    Ok(())
}

/// Local id, remote id and status of every linked row.
pub async fn linked_rows(
    conn: &Connection,
    entity: &EntityDescriptor,
) -> Result<Vec<(i64, String, SyncStatus)>> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT local_id, remote_doc_id, sync_status FROM {} \
                 WHERE remote_doc_id IS NOT NULL",
                entity.local_table
            ),
            (),
        )
        .await?;

    let mut linked = Vec::new();
    while let Some(row) = rows.next().await? {
        let local_id = row.get::<i64>(0)?;
        let remote_doc_id = row.get::<String>(1)?;
        let status = row.get::<String>(2)?.parse()?;
        linked.push((local_id, remote_doc_id, status));
    }
    Ok(linked)
}

/// Remote id of a row in `table`, if the row exists and is linked.
pub async fn remote_id_for(
    conn: &Connection,
    table: &str,
    local_id: i64,
) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            &format!("SELECT remote_doc_id FROM {table} WHERE local_id = ?1"),
            libsql::params![local_id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => text_value(row.get_value(0)?, "remote_doc_id"),
        None => Ok(None),
    }
}

/// Local id of the row in `table` linked to a remote id.
pub async fn local_id_for(
    conn: &Connection,
    table: &str,
    remote_doc_id: &str,
) -> Result<Option<i64>> {
    let mut rows = conn
        .query(
            &format!("SELECT local_id FROM {table} WHERE remote_doc_id = ?1"),
            libsql::params![remote_doc_id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<i64>(0)?)),
        None => Ok(None),
    }
}

/// Count rows per status.
pub async fn status_counts(conn: &Connection, entity: &EntityDescriptor) -> Result<StatusCounts> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
                entity.local_table
            ),
            (),
        )
        .await?;

    let mut counts = StatusCounts::default();
    while let Some(row) = rows.next().await? {
        let status: SyncStatus = row.get::<String>(0)?.parse()?;
        let count = usize::try_from(row.get::<i64>(1)?).unwrap_or_default();
        match status {
            SyncStatus::PendingCreate => counts.pending_create = count,
            SyncStatus::PendingUpdate => counts.pending_update = count,
            SyncStatus::PendingDelete => counts.pending_delete = count,
            SyncStatus::Synced => counts.synced = count,
        }
    }
    Ok(counts)
}

/// Whether a table holds no rows at all.
pub async fn is_empty(conn: &Connection, entity: &EntityDescriptor) -> Result<bool> {
    let mut rows = conn
        .query(
            &format!("SELECT EXISTS(SELECT 1 FROM {})", entity.local_table),
            (),
        )
        .await?;
    Ok(match rows.next().await? {
        Some(row) => row.get::<i64>(0)? == 0,
        None => true,
    })
}
