//! Collaborator traits
//!
//! Every external tool the workflow drives sits behind one of these traits,
//! so the workflow can run against fakes in tests.

use crate::context::ExecutionContext;
use crate::error::Result;
use async_trait::async_trait;
use clusterflow_core::ClusterIdentity;
use std::fmt;
use std::path::{Path, PathBuf};

/// Outcome of a check whose failure is an expected, recoverable signal
/// rather than an error (an absent cluster, a not-yet-reachable API).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Succeeded,
    Failed(String),
}

impl Probe {
    pub fn is_success(&self) -> bool {
        matches!(self, Probe::Succeeded)
    }

    /// Collapse any result into a probe, keeping the error text as reason.
    pub fn from_result<T, E: fmt::Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => Probe::Succeeded,
            Err(e) => Probe::Failed(e.to_string()),
        }
    }
}

/// Remote backend settings for `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub bucket: String,
    pub key: String,
}

impl BackendConfig {
    /// State key of the main infra document set.
    pub const INFRA_STATE_KEY: &'static str = "terraform/terraform.tfstate";

    pub fn for_cluster(identity: &ClusterIdentity) -> Self {
        Self {
            bucket: identity.state_bucket().to_string(),
            key: Self::INFRA_STATE_KEY.to_string(),
        }
    }
}

/// Arguments of one infra `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    /// `-var key=value` pairs, in order.
    pub variables: Vec<(String, String)>,
    /// Absolute paths of `-var-file`s, in order.
    pub var_files: Vec<PathBuf>,
    pub auto_approve: bool,
    pub refresh: bool,
}

impl ApplyRequest {
    /// Request carrying the variables every document set receives.
    pub fn for_cluster(identity: &ClusterIdentity, var_files: Vec<PathBuf>) -> Self {
        Self {
            variables: vec![
                ("cluster_name".to_string(), identity.name().to_string()),
                (
                    "state_bucket_name".to_string(),
                    identity.state_bucket().to_string(),
                ),
            ],
            var_files,
            auto_approve: false,
            refresh: true,
        }
    }

    pub fn auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Declarative infrastructure applier (terraform).
#[async_trait]
pub trait InfraApplier: Send + Sync {
    fn name(&self) -> &str;

    /// Initialize the document set in `dir`, with a remote backend when given.
    async fn init(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        backend: Option<&BackendConfig>,
    ) -> Result<()>;

    async fn apply(&self, ctx: &ExecutionContext, dir: &Path, request: &ApplyRequest)
    -> Result<()>;

    /// Raw output document of the document set in `dir`.
    async fn output(&self, ctx: &ExecutionContext, dir: &Path) -> Result<Vec<u8>>;
}

/// Kubernetes cluster manager (kops).
#[async_trait]
pub trait ClusterManager: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the cluster is registered in the state store.
    async fn get_cluster(&self, ctx: &ExecutionContext) -> Probe;

    /// Register (or overwrite) the cluster spec read from `spec`.
    async fn replace_cluster_spec(&self, ctx: &ExecutionContext, spec: &str, force: bool)
    -> Result<()>;

    /// Emit the infra document for the cluster into `out_dir`.
    async fn update_cluster(
        &self,
        ctx: &ExecutionContext,
        out_dir: &Path,
        create_kubeconfig: bool,
    ) -> Result<()>;

    async fn export_admin_kubeconfig(&self, ctx: &ExecutionContext, path: &Path) -> Result<()>;

    async fn rolling_update(&self, ctx: &ExecutionContext, cloud_only: bool) -> Result<()>;

    /// Validation report on stdout. A failing validation still yields its
    /// report; only a failure to run at all is an error.
    async fn validate(&self, ctx: &ExecutionContext) -> Result<Vec<u8>>;
}

/// Kubernetes API client (kubectl).
#[async_trait]
pub trait ClusterApi: Send + Sync {
    fn name(&self) -> &str;

    async fn apply_manifests(&self, ctx: &ExecutionContext, manifests: &str) -> Result<()>;

    /// Cheap authenticated read against the API.
    async fn probe(&self, ctx: &ExecutionContext) -> Probe;
}

/// Remote object store holding the state bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    /// Create `key` only if it does not exist yet. Returns whether it was
    /// created.
    async fn put_object_if_absent(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<bool>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}
