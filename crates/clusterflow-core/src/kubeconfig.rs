//! Final kubeconfig
//!
//! The kubeconfig handed to the operator never embeds credentials: the user
//! entry runs `aws-iam-authenticator` through the client exec plugin and
//! assumes the cluster admin role from the infra output.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Default `apiVersion` of the exec plugin's credential format.
pub const DEFAULT_CLIENT_AUTH_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

const AUTHENTICATOR_COMMAND: &str = "aws-iam-authenticator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context", default)]
    pub current_context: String,
    #[serde(default)]
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Kubeconfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Where the cluster API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub server: String,
    pub certificate_authority_data: Option<String>,
}

impl ClusterEndpoint {
    /// The cluster manager's default API hostname, without CA data.
    pub fn fallback(cluster_name: &str) -> Self {
        Self {
            server: format!("https://api.{cluster_name}"),
            certificate_authority_data: None,
        }
    }

    /// Read the endpoint of `cluster_name` from an existing kubeconfig
    /// (the admin one exported by the cluster manager).
    pub fn from_kubeconfig(yaml: &str, cluster_name: &str) -> Result<Option<Self>> {
        Ok(Kubeconfig::from_yaml(yaml)?
            .clusters
            .into_iter()
            .find(|c| c.name == cluster_name)
            .map(|c| Self {
                server: c.cluster.server,
                certificate_authority_data: c.cluster.certificate_authority_data,
            }))
    }
}

pub struct KubeconfigParams<'a> {
    pub cluster_name: &'a str,
    /// `apiVersion` of the exec credential format.
    pub api_version: &'a str,
    pub admin_role_arn: &'a str,
    pub endpoint: ClusterEndpoint,
}

pub fn build_kubeconfig(params: KubeconfigParams<'_>) -> Kubeconfig {
    let name = params.cluster_name.to_string();

    Kubeconfig {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        clusters: vec![NamedCluster {
            name: name.clone(),
            cluster: ClusterEntry {
                server: params.endpoint.server,
                certificate_authority_data: params.endpoint.certificate_authority_data,
            },
        }],
        contexts: vec![NamedContext {
            name: name.clone(),
            context: ContextEntry {
                cluster: name.clone(),
                user: name.clone(),
            },
        }],
        current_context: name.clone(),
        users: vec![NamedUser {
            name: name.clone(),
            user: UserEntry {
                exec: Some(ExecConfig {
                    api_version: params.api_version.to_string(),
                    command: AUTHENTICATOR_COMMAND.to_string(),
                    args: vec![
                        "token".to_string(),
                        "-i".to_string(),
                        name,
                        "-r".to_string(),
                        params.admin_role_arn.to_string(),
                    ],
                }),
            },
        }],
    }
}
