//! Asset bundle
//!
//! The directory the workflow's definitions and templates are read from:
//!
//! ```text
//! <assets>/
//!   tf_state/   bootstrap infra definition (state bucket)
//!   tf/         full infra definition
//!   kops/       cluster spec templates, concatenated by file name
//!   k8s/*.yaml  in-cluster manifest templates (optional)
//! ```

use crate::error::{ProvisionError, Result};
use clusterflow_cloud::{AssetStore, Destination};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const BOOTSTRAP_DIR: &str = "tf_state";
pub const INFRA_DIR: &str = "tf";
pub const CLUSTER_SPEC_DIR: &str = "kops";
pub const MANIFEST_DIR: &str = "k8s";

/// A named template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct AssetBundle {
    root: PathBuf,
    cluster_spec: Vec<Template>,
    manifests: Vec<Template>,
}

impl AssetBundle {
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [BOOTSTRAP_DIR, INFRA_DIR, CLUSTER_SPEC_DIR] {
            if !root.join(dir).is_dir() {
                return Err(ProvisionError::MissingBundle(root.join(dir)));
            }
        }

        let cluster_spec = read_templates(&root.join(CLUSTER_SPEC_DIR), None).await?;
        if cluster_spec.is_empty() {
            return Err(ProvisionError::EmptyClusterSpec(root.join(CLUSTER_SPEC_DIR)));
        }

        let manifest_dir = root.join(MANIFEST_DIR);
        let manifests = if manifest_dir.is_dir() {
            read_templates(&manifest_dir, Some("yaml")).await?
        } else {
            Vec::new()
        };

        debug!(
            root = %root.display(),
            cluster_spec = cluster_spec.len(),
            manifests = manifests.len(),
            "Loaded asset bundle"
        );
        Ok(Self {
            root,
            cluster_spec,
            manifests,
        })
    }

    pub fn cluster_spec(&self) -> &[Template] {
        &self.cluster_spec
    }

    pub fn manifests(&self) -> &[Template] {
        &self.manifests
    }

    /// Stage both infra definitions as local-only assets.
    pub async fn stage_definitions(&self, assets: &mut AssetStore) -> Result<usize> {
        let mut staged = 0;
        for dir in [BOOTSTRAP_DIR, INFRA_DIR] {
            staged += assets
                .stage_dir(&self.root.join(dir), dir, Destination::Local)
                .await?;
        }
        Ok(staged)
    }
}

/// Regular files directly in `dir`, sorted by name.
async fn read_templates(dir: &Path, extension: Option<&str>) -> Result<Vec<Template>> {
    let mut templates = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(ext) = extension
            && path.extension().and_then(|e| e.to_str()) != Some(ext)
        {
            continue;
        }

        templates.push(Template {
            name: entry.file_name().to_string_lossy().into_owned(),
            source: fs::read_to_string(&path).await?,
        });
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}
