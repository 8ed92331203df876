//! Cluster identity
//!
//! A cluster name is the only thing the operator supplies; the remote state
//! bucket and the local working directory are derived from it so that every
//! re-run of the same operation lands on the same state. Names are
//! lowercase so that no two names share a bucket.

use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};

const STATE_BUCKET_SUFFIX: &str = "-state";

/// Stable identity of one cluster across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    name: String,
    state_bucket: String,
    work_dir: PathBuf,
}

impl ClusterIdentity {
    /// Derive the identity for `name`, placing the working directory under
    /// `work_root`.
    pub fn new(name: impl Into<String>, work_root: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(CoreError::InvalidClusterName(name));
        }

        Ok(Self {
            state_bucket: state_bucket_name(&name),
            work_dir: work_root.as_ref().join(&name),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bucket holding infra state, cluster-manager state and mirrored assets.
    pub fn state_bucket(&self) -> &str {
        &self.state_bucket
    }

    /// Per-cluster local working directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Cluster-manager state store location inside the state bucket.
    pub fn state_store_uri(&self) -> String {
        format!("s3://{}/kops", self.state_bucket)
    }
}

/// Bucket names only allow lowercase letters, digits and hyphens here;
/// everything else (notably the dots of a DNS-style cluster name) becomes `-`.
pub fn state_bucket_name(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{normalized}{STATE_BUCKET_SUFFIX}")
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
}
