use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Manifest is corrupt: {0}")]
    ManifestCorrupt(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Operation '{name}' was dropped before it completed")]
    OperationAbandoned { name: String },

    #[error("Operation '{name}' panicked: {message}")]
    OperationPanicked { name: String, message: String },

    #[error("Backup {0} not found")]
    BackupNotFound(String),

    #[error(transparent)]
    Config(#[from] core_runtime::Error),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
