//! Provisioning error types

use crate::phase::RunPhase;
use clusterflow_cloud::CloudError;
use clusterflow_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: RunPhase },

    #[error("Asset bundle is missing {0}")]
    MissingBundle(PathBuf),

    #[error("Asset bundle has no cluster spec templates in {0}")]
    EmptyClusterSpec(PathBuf),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
