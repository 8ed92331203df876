use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid cluster name '{0}': use lowercase letters, digits, '.' and '-' only")]
    InvalidClusterName(String),

    #[error("Malformed document at {path}: expected {expected}")]
    MalformedDocument {
        path: String,
        expected: &'static str,
    },

    #[error("Infra output is missing '{0}'")]
    MissingOutput(String),

    #[error("Invalid input file: {path}\nReason: {message}")]
    InvalidInput { path: PathBuf, message: String },

    #[error("IO error: {path}\nReason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Template render error in {name}: {message}")]
    TemplateRender { name: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        CoreError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
