use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pharmasync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{entity} #{id} not found")]
    RecordNotFound { entity: &'static str, id: i64 },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Offline mode is enabled; unset PHARMASYNC_OFFLINE or drop --offline to sync")]
    OfflineMode,
    #[error(
        "Sync is not configured. Set PHARMASYNC_REMOTE_URL (and PHARMASYNC_REMOTE_TOKEN if the store requires one)."
    )]
    SyncNotConfigured,
}
