//! Data models for Pharmasync

mod record;
mod sync_conflict;
mod sync_status;

pub use record::{new_remote_doc_id, Fields, LocalRecord};
pub use sync_conflict::SyncConflict;
pub use sync_status::SyncStatus;
