//! Field translation between local rows and remote documents.
//!
//! Reference fields hold local ids locally and remote document ids remotely.
//! Local ids never leave this store.

use libsql::Connection;
use serde_json::Value;

use crate::db::records;
use crate::error::{Error, Result};
use crate::models::{Fields, LocalRecord};
use crate::schema::{EntityDescriptor, MODIFIED_FIELD};

/// Remote payload for a local row: domain fields plus the modification stamp.
pub(super) async fn to_remote_fields(
    conn: &Connection,
    entity: &EntityDescriptor,
    record: &LocalRecord,
) -> Result<Fields> {
    let mut fields = Fields::new();
    for field in entity.fields {
        let value = record.fields.get(field.name).cloned().unwrap_or(Value::Null);
        let value = match (field.referenced_table(), value.as_i64()) {
            (Some(table), Some(local_id)) => records::remote_id_for(conn, table, local_id)
                .await?
                .map(Value::String)
                .ok_or_else(|| Error::UnresolvedReference {
                    table: table.to_string(),
                    key: local_id.to_string(),
                })?,
            _ => value,
        };
        fields.insert(field.name.to_string(), value);
    }
    fields.insert(
        MODIFIED_FIELD.to_string(),
        Value::from(record.last_modified_local),
    );
    Ok(fields)
}

/// Local fields for a remote document.
///
/// Undeclared document fields are ignored; declared ones are validated.
pub(super) async fn to_local_fields(
    conn: &Connection,
    entity: &EntityDescriptor,
    document: &Fields,
) -> Result<Fields> {
    let mut fields = Fields::new();
    for field in entity.fields {
        let value = document.get(field.name).cloned().unwrap_or(Value::Null);
        let value = match (field.referenced_table(), value) {
            (Some(table), Value::String(remote_doc_id)) => {
                records::local_id_for(conn, table, &remote_doc_id)
                    .await?
                    .map(Value::from)
                    .ok_or_else(|| Error::UnresolvedReference {
                        table: table.to_string(),
                        key: remote_doc_id.clone(),
                    })?
            }
            (Some(_), Value::Null) => Value::Null,
            (Some(table), other) => {
                return Err(Error::InvalidField {
                    field: field.name.to_string(),
                    reason: format!("expected a {table} document id, got {other}"),
                });
            }
            (None, value) => value,
        };
        fields.insert(field.name.to_string(), value);
    }
    entity.validate(&fields)
}
