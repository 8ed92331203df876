//! Configuration file contents

use clusterflow_core::kubeconfig::DEFAULT_CLIENT_AUTH_API_VERSION;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterflowConfig {
    /// Parent of the per-cluster working directories. Defaults to the OS
    /// temp dir.
    pub work_root: Option<PathBuf>,
    /// Asset bundle directory.
    pub assets_dir: PathBuf,
    pub client_authentication_api_version: String,
    pub poll_interval_secs: u64,
    pub grace_period_secs: u64,
    pub verbose: bool,
    pub binaries: Binaries,
    pub aws: AwsSettings,
}

impl Default for ClusterflowConfig {
    fn default() -> Self {
        Self {
            work_root: None,
            assets_dir: PathBuf::from("."),
            client_authentication_api_version: DEFAULT_CLIENT_AUTH_API_VERSION.to_string(),
            poll_interval_secs: 30,
            grace_period_secs: 180,
            verbose: false,
            binaries: Binaries::default(),
            aws: AwsSettings::default(),
        }
    }
}

impl ClusterflowConfig {
    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Executables of the external tools, names or paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Binaries {
    pub terraform: String,
    pub kops: String,
    pub kubectl: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            terraform: "terraform".to_string(),
            kops: "kops".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AwsSettings {
    pub profile: Option<String>,
    pub region: Option<String>,
}
