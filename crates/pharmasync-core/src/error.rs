//! Error types for pharmasync-core

use thiserror::Error;

/// Result type alias using pharmasync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pharmasync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error talking to the remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A field value does not match its declared type
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// A foreign key could not be translated between stores
    #[error("Unresolved reference into '{table}': {key}")]
    UnresolvedReference { table: String, key: String },

    /// No entity mapping exists for the given local table
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Remote store rejected or failed a call
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Issuing more than the derived on-hand quantity
    #[error("Insufficient stock for medication {medication_id}: {available} available, {requested} requested")]
    InsufficientStock {
        medication_id: i64,
        available: i64,
        requested: i64,
    },
}

impl Error {
    /// Whether this error concerns a single record and should not abort a pass.
    pub const fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidField { .. } | Self::UnresolvedReference { .. }
        )
    }
}
