//! AWS collaborators for ClusterFlow
//!
//! - [`Terraform`]: infra applier
//! - [`Kops`]: cluster manager
//! - [`Kubectl`]: cluster API client
//! - [`S3ObjectStore`]: state bucket access
//!
//! The CLI wrappers require the respective binaries on `PATH` (or an
//! explicit path). Environment for each child process comes from the
//! [`clusterflow_cloud::ExecutionContext`] passed to every call.

pub mod command;
pub mod error;
pub mod kops;
pub mod kubectl;
pub mod s3;
pub mod terraform;

pub use error::{AwsError, Result};
pub use kops::Kops;
pub use kubectl::Kubectl;
pub use s3::S3ObjectStore;
pub use terraform::Terraform;
