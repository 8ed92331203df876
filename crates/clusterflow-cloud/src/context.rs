//! Execution context
//!
//! Everything the external tools read from their environment, held as a
//! value. Nothing here touches the process environment; adapters apply
//! [`ExecutionContext::env_vars`] to the single child process they spawn.

use clusterflow_core::ClusterIdentity;
use clusterflow_core::environment::{
    ENV_CLUSTER, ENV_FEATURE_FLAGS, ENV_KUBECONFIG, ENV_STATE_STORE, KOPS_FEATURE_FLAGS,
};
use std::path::{Path, PathBuf};

const ENV_AWS_PROFILE: &str = "AWS_PROFILE";
const ENV_AWS_REGION: &str = "AWS_REGION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    cluster_name: String,
    state_store: String,
    feature_flags: String,
    kubeconfig: Option<PathBuf>,
    aws_profile: Option<String>,
    aws_region: Option<String>,
    verbose: bool,
}

impl ExecutionContext {
    pub fn new(identity: &ClusterIdentity) -> Self {
        Self {
            cluster_name: identity.name().to_string(),
            state_store: identity.state_store_uri(),
            feature_flags: KOPS_FEATURE_FLAGS.to_string(),
            kubeconfig: None,
            aws_profile: None,
            aws_region: None,
            verbose: false,
        }
    }

    pub fn with_aws(mut self, profile: Option<String>, region: Option<String>) -> Self {
        self.aws_profile = profile;
        self.aws_region = region;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Point later kubeconfig-reading commands at `path`.
    pub fn set_kubeconfig(&mut self, path: impl Into<PathBuf>) {
        self.kubeconfig = Some(path.into());
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn state_store(&self) -> &str {
        &self.state_store
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    pub fn aws_profile(&self) -> Option<&str> {
        self.aws_profile.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.aws_region.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Variables to set on a spawned child process.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (ENV_CLUSTER, self.cluster_name.clone()),
            (ENV_STATE_STORE, self.state_store.clone()),
            (ENV_FEATURE_FLAGS, self.feature_flags.clone()),
        ];
        if let Some(kubeconfig) = &self.kubeconfig {
            vars.push((ENV_KUBECONFIG, kubeconfig.display().to_string()));
        }
        if let Some(profile) = &self.aws_profile {
            vars.push((ENV_AWS_PROFILE, profile.clone()));
        }
        if let Some(region) = &self.aws_region {
            vars.push((ENV_AWS_REGION, region.clone()));
        }
        vars
    }
}
