//! Default environment file
//!
//! `.env` captures what a later shell session needs to address the cluster
//! with the cluster manager and kubectl.

use crate::identity::ClusterIdentity;

/// Cluster-manager feature flags: emit JSON infra documents and leave managed
/// files to us.
pub const KOPS_FEATURE_FLAGS: &str = "+TerraformJSON,-TerraformManagedFiles";

pub const ENV_CLUSTER: &str = "CLUSTER";
pub const ENV_STATE_STORE: &str = "KOPS_STATE_STORE";
pub const ENV_FEATURE_FLAGS: &str = "KOPS_FEATURE_FLAGS";
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";

/// Path of the environment file relative to the working directory.
pub const ENV_FILE_ASSET: &str = ".env";

/// Render the environment file. `kubeconfig` is written as given, so pass
/// the path the operator should use.
pub fn default_environment_file(identity: &ClusterIdentity, kubeconfig: &str) -> String {
    [
        (ENV_CLUSTER, identity.name().to_string()),
        (ENV_STATE_STORE, identity.state_store_uri()),
        (ENV_FEATURE_FLAGS, KOPS_FEATURE_FLAGS.to_string()),
        (ENV_KUBECONFIG, kubeconfig.to_string()),
    ]
    .iter()
    .map(|(key, value)| format!("{key}={value}\n"))
    .collect()
}
