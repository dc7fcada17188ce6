//! pharmasync-core - Core library for Pharmasync
//!
//! This crate contains the local store, the remote store adapters, the
//! mutation queue, and the bidirectional sync engine used by the Pharmasync
//! interfaces. Current stock is derived from four append-only ledgers rather
//! than stored as a counter.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod schema;
pub mod services;
pub mod state;
pub mod stock;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Fields, LocalRecord, SyncConflict, SyncStatus};
pub use schema::{EntityDescriptor, FieldDef, FieldType, ENTITY_MAPPINGS};
pub use services::LocalStore;
pub use state::SyncState;
pub use sync::{SyncEngine, SyncOutcome, SyncReport};
