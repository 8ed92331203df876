//! AWS collaborator error types

use clusterflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("{0} not found on PATH. Install it or set binaries.{0} in the configuration")]
    ToolNotFound(String),

    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("S3 {operation} failed: {message}")]
    S3 {
        operation: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::CommandFailed {
                program,
                status,
                stderr,
            } => CloudError::CommandFailed {
                program,
                status,
                stderr,
            },
            AwsError::ToolNotFound(program) => CloudError::CommandFailed {
                status: "not found".to_string(),
                stderr: AwsError::ToolNotFound(program.clone()).to_string(),
                program,
            },
            AwsError::S3 { .. } => CloudError::StorageError(err.to_string()),
            AwsError::IoError(e) => CloudError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
