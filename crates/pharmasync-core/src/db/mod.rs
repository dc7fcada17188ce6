//! Database layer for Pharmasync

mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
pub mod records;
mod seed;

pub use conflict_repository::{LibSqlConflictRepository, LWW_STRATEGY};
pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use records::StatusCounts;
pub use seed::Seed;
