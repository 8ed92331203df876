//! Collaborator error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Command execution failed: {program} ({status})\n{stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Invalid asset path '{0}': must be relative and stay inside the working directory")]
    InvalidAssetPath(String),

    #[error("Invalid asset pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error(transparent)]
    Core(#[from] clusterflow_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
