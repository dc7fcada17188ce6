//! Entity schema descriptors.
//!
//! Every syncable local table is described by an [`EntityDescriptor`]: its
//! remote collection, an ordered list of typed domain fields, and the natural
//! key used to link records created independently on both sides. Push and
//! pull map rows through these descriptors instead of reflecting over
//! arbitrary columns.

use libsql::Value as SqlValue;
use serde_json::{Number, Value};

use crate::models::Fields;
use crate::{Error, Result};

/// Remote document field carrying the modification timestamp.
///
/// The local column is pushed verbatim, so both sides share the name.
pub const MODIFIED_FIELD: &str = "last_modified_local";

/// Bookkeeping columns present on every syncable table, in select order.
pub const SYNC_COLUMNS: [&str; 4] = [
    "local_id",
    "remote_doc_id",
    "sync_status",
    MODIFIED_FIELD,
];

/// Field types supported by entity descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Bool,
    /// Unix milliseconds
    Timestamp,
    /// Local id of a row in another syncable table
    Reference(&'static str),
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Real => write!(f, "real"),
            Self::Bool => write!(f, "bool"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Reference(table) => write!(f, "reference to {table}"),
        }
    }
}

/// Definition of a domain field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }

    /// Referenced local table, if this field is a foreign key.
    pub const fn referenced_table(&self) -> Option<&'static str> {
        match self.field_type {
            FieldType::Reference(table) => Some(table),
            _ => None,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidField {
            field: self.name.to_string(),
            reason: reason.into(),
        }
    }

    /// Validate a JSON value against this field, coercing where lossless.
    ///
    /// References are expected in their local form (integer local id).
    pub fn normalize(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return if self.required {
                Err(self.invalid("value is required"))
            } else {
                Ok(Value::Null)
            };
        }

        match self.field_type {
            FieldType::Text => value
                .as_str()
                .map(|text| Value::String(text.to_string()))
                .ok_or_else(|| self.invalid(format!("expected text, got {value}"))),
            FieldType::Integer | FieldType::Timestamp | FieldType::Reference(_) => {
                as_integer(value)
                    .map(Value::from)
                    .ok_or_else(|| self.invalid(format!("expected integer, got {value}")))
            }
            FieldType::Real => value
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| self.invalid(format!("expected number, got {value}"))),
            FieldType::Bool => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| self.invalid(format!("expected bool, got {value}"))),
        }
    }

    /// Convert a normalized JSON value into a SQL parameter.
    pub fn to_sql(&self, value: &Value) -> Result<SqlValue> {
        let value = self.normalize(value)?;
        Ok(match (self.field_type, value) {
            (_, Value::Null) => SqlValue::Null,
            (FieldType::Text, Value::String(text)) => SqlValue::Text(text),
            (FieldType::Bool, Value::Bool(flag)) => SqlValue::Integer(i64::from(flag)),
            (FieldType::Real, value) => SqlValue::Real(value.as_f64().unwrap_or_default()),
            (_, value) => SqlValue::Integer(value.as_i64().unwrap_or_default()),
        })
    }

    /// Convert a SQL column value into its JSON form.
    pub fn from_sql(&self, value: SqlValue) -> Result<Value> {
        #[allow(clippy::cast_precision_loss)]
        let converted = match (self.field_type, value) {
            (_, SqlValue::Null) => Value::Null,
            (FieldType::Text, SqlValue::Text(text)) => Value::String(text),
            (FieldType::Bool, SqlValue::Integer(flag)) => Value::Bool(flag != 0),
            (FieldType::Real, SqlValue::Real(number)) => {
                Number::from_f64(number).map_or(Value::Null, Value::Number)
            }
            (FieldType::Real, SqlValue::Integer(number)) => {
                Number::from_f64(number as f64).map_or(Value::Null, Value::Number)
            }
            (
                FieldType::Integer | FieldType::Timestamp | FieldType::Reference(_),
                SqlValue::Integer(number),
            ) => Value::from(number),
            (field_type, other) => {
                return Err(self.invalid(format!(
                    "stored value {other:?} does not match declared {field_type}"
                )));
            }
        };
        Ok(converted)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    // Document stores frequently serialise every number as a double.
    let number = value.as_f64()?;
    let truncated = number.trunc();
    (truncated == number && truncated.abs() < 9.0e15).then_some(truncated as i64)
}

/// Pairing of one local table with one remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub local_table: &'static str,
    pub remote_collection: &'static str,
    pub fields: &'static [FieldDef],
    /// Fields compared for identity linking; empty means never linked.
    pub natural_key: &'static [&'static str],
}

impl EntityDescriptor {
    /// Get a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Comma separated list of every column, bookkeeping columns first.
    pub fn select_columns(&self) -> String {
        SYNC_COLUMNS
            .iter()
            .copied()
            .chain(self.fields.iter().map(|field| field.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Validate a complete set of domain fields.
    ///
    /// Unknown fields are rejected; missing optional fields become null.
    pub fn validate(&self, fields: &Fields) -> Result<Fields> {
        if let Some(unknown) = fields.keys().find(|name| self.field(name).is_none()) {
            return Err(Error::InvalidField {
                field: unknown.clone(),
                reason: format!("not a field of {}", self.local_table),
            });
        }

        let mut validated = Fields::new();
        for field in self.fields {
            let value = fields.get(field.name).unwrap_or(&Value::Null);
            validated.insert(field.name.to_string(), field.normalize(value)?);
        }
        Ok(validated)
    }

    /// Extract the natural key values, or `None` if any component is null.
    pub fn natural_key_values(&self, fields: &Fields) -> Option<Vec<Value>> {
        if self.natural_key.is_empty() {
            return None;
        }
        self.natural_key
            .iter()
            .map(|name| fields.get(*name).filter(|value| !value.is_null()).cloned())
            .collect()
    }
}

const MEDICATION_FIELDS: &[FieldDef] = &[
    FieldDef::required("name", FieldType::Text),
    FieldDef::optional("category", FieldType::Text),
    FieldDef::optional("unit", FieldType::Text),
    FieldDef::optional("unit_price", FieldType::Real),
    FieldDef::optional("reorder_level", FieldType::Integer),
];

const PATIENT_FIELDS: &[FieldDef] = &[
    FieldDef::required("first_name", FieldType::Text),
    FieldDef::required("last_name", FieldType::Text),
    FieldDef::optional("birth_date", FieldType::Text),
    FieldDef::optional("phone", FieldType::Text),
];

const RECEIPT_FIELDS: &[FieldDef] = &[
    FieldDef::required("medication_id", FieldType::Reference("medications")),
    FieldDef::required("quantity", FieldType::Integer),
    FieldDef::required("received_at", FieldType::Timestamp),
    FieldDef::optional("supplier", FieldType::Text),
    FieldDef::optional("batch_number", FieldType::Text),
    FieldDef::optional("expiry_date", FieldType::Text),
];

const ISSUANCE_FIELDS: &[FieldDef] = &[
    FieldDef::optional("patient_id", FieldType::Reference("patients")),
    FieldDef::required("issued_at", FieldType::Timestamp),
    FieldDef::optional("prescriber", FieldType::Text),
    FieldDef::optional("note", FieldType::Text),
];

const ISSUANCE_LINE_FIELDS: &[FieldDef] = &[
    FieldDef::required("issuance_id", FieldType::Reference("issuances")),
    FieldDef::required("medication_id", FieldType::Reference("medications")),
    FieldDef::required("quantity", FieldType::Integer),
];

const RETURN_FIELDS: &[FieldDef] = &[
    FieldDef::required("medication_id", FieldType::Reference("medications")),
    FieldDef::required("quantity", FieldType::Integer),
    FieldDef::required("returned_at", FieldType::Timestamp),
    FieldDef::optional("reason", FieldType::Text),
];

const ADJUSTMENT_FIELDS: &[FieldDef] = &[
    FieldDef::required("medication_id", FieldType::Reference("medications")),
    FieldDef::required("quantity", FieldType::Integer),
    FieldDef::required("adjusted_at", FieldType::Timestamp),
    FieldDef::optional("reason", FieldType::Text),
];

pub const MEDICATIONS: EntityDescriptor = EntityDescriptor {
    local_table: "medications",
    remote_collection: "medications",
    fields: MEDICATION_FIELDS,
    natural_key: &["name"],
};

pub const PATIENTS: EntityDescriptor = EntityDescriptor {
    local_table: "patients",
    remote_collection: "patients",
    fields: PATIENT_FIELDS,
    natural_key: &["first_name", "last_name"],
};

pub const STOCK_RECEIPTS: EntityDescriptor = EntityDescriptor {
    local_table: "stock_receipts",
    remote_collection: "stock_receipts",
    fields: RECEIPT_FIELDS,
    natural_key: &[],
};

pub const ISSUANCES: EntityDescriptor = EntityDescriptor {
    local_table: "issuances",
    remote_collection: "issuances",
    fields: ISSUANCE_FIELDS,
    natural_key: &[],
};

pub const ISSUANCE_LINES: EntityDescriptor = EntityDescriptor {
    local_table: "issuance_lines",
    remote_collection: "issuance_lines",
    fields: ISSUANCE_LINE_FIELDS,
    natural_key: &[],
};

pub const STOCK_RETURNS: EntityDescriptor = EntityDescriptor {
    local_table: "stock_returns",
    remote_collection: "stock_returns",
    fields: RETURN_FIELDS,
    natural_key: &[],
};

pub const STOCK_ADJUSTMENTS: EntityDescriptor = EntityDescriptor {
    local_table: "stock_adjustments",
    remote_collection: "stock_adjustments",
    fields: ADJUSTMENT_FIELDS,
    natural_key: &[],
};

/// Entity mappings in sync order; referenced tables precede referencing ones.
pub const ENTITY_MAPPINGS: &[EntityDescriptor] = &[
    MEDICATIONS,
    PATIENTS,
    STOCK_RECEIPTS,
    ISSUANCES,
    ISSUANCE_LINES,
    STOCK_RETURNS,
    STOCK_ADJUSTMENTS,
];

/// Look up an entity mapping by local table name.
pub fn entity(local_table: &str) -> Result<&'static EntityDescriptor> {
    ENTITY_MAPPINGS
        .iter()
        .find(|entity| entity.local_table == local_table)
        .ok_or_else(|| Error::UnknownEntity(local_table.to_string()))
}
