//! Asset store
//!
//! Generated files are staged in memory under a relative path and written
//! out by [`AssetStore::flush`]. Staging a path again replaces the earlier
//! content. Flushing writes each selected asset to the working directory
//! and, when the asset syncs remotely and a remote lock is held, to the
//! state bucket under `assets/`.

use crate::error::{CloudError, Result};
use crate::state::RemoteStateScope;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Key prefix of synced assets in the state bucket.
pub const REMOTE_ASSET_PREFIX: &str = "assets";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Local,
    LocalAndRemote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: String,
    pub content: Vec<u8>,
    pub destination: Destination,
}

#[derive(Debug)]
pub struct AssetStore {
    root: PathBuf,
    assets: BTreeMap<String, Asset>,
}

impl AssetStore {
    /// Store flushing into `root`, the cluster's working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            assets: BTreeMap::new(),
        }
    }

    /// Stage `content` at `path`, replacing anything staged there before.
    pub fn stage(
        &mut self,
        path: &str,
        content: impl Into<Vec<u8>>,
        destination: Destination,
    ) -> Result<()> {
        validate_path(path)?;
        self.assets.insert(
            path.to_string(),
            Asset {
                path: path.to_string(),
                content: content.into(),
                destination,
            },
        );
        Ok(())
    }

    /// Stage every file below `source` under `prefix`, keeping the relative
    /// layout. Returns how many files were staged.
    pub async fn stage_dir(
        &mut self,
        source: &Path,
        prefix: &str,
        destination: Destination,
    ) -> Result<usize> {
        let mut staged = 0;
        let mut pending = vec![source.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let relative = path
                    .strip_prefix(source)
                    .map_err(|_| CloudError::InvalidAssetPath(path.display().to_string()))?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let asset_path = if prefix.is_empty() {
                    relative
                } else {
                    format!("{}/{}", prefix.trim_end_matches('/'), relative)
                };

                let content = fs::read(&path).await?;
                self.stage(&asset_path, content, destination)?;
                staged += 1;
            }
        }

        debug!("Staged {} files from {}", staged, source.display());
        Ok(staged)
    }

    pub fn get(&self, path: &str) -> Option<&Asset> {
        self.assets.get(path)
    }

    /// Staged paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    /// Assets selected by `pattern` (all when `None`), sorted by path.
    pub fn matching(&self, pattern: Option<&str>) -> Result<Vec<&Asset>> {
        let Some(pattern) = pattern else {
            return Ok(self.assets.values().collect());
        };

        let patterns = compile(pattern)?;
        Ok(self
            .assets
            .values()
            .filter(|asset| {
                patterns
                    .iter()
                    .any(|p| p.matches_with(&asset.path, MATCH_OPTIONS))
            })
            .collect())
    }

    /// Write the selected assets. Remote writes go through `scope` and only
    /// happen while it holds the remote lock. Returns how many assets were
    /// selected.
    pub async fn flush(
        &self,
        pattern: Option<&str>,
        scope: Option<&RemoteStateScope<'_>>,
    ) -> Result<usize> {
        let selected = self.matching(pattern)?;
        let remote = scope.and_then(|s| s.remote());

        for asset in &selected {
            write_local(&self.root, asset).await?;

            if asset.destination == Destination::LocalAndRemote
                && let Some((store, bucket)) = remote
            {
                let key = format!("{REMOTE_ASSET_PREFIX}/{}", asset.path);
                store.put_object(bucket, &key, asset.content.clone()).await?;
                debug!("Synced {} to s3://{}/{}", asset.path, bucket, key);
            }
        }

        debug!(
            pattern = pattern.unwrap_or("*"),
            count = selected.len(),
            "Flushed assets"
        );
        Ok(selected.len())
    }
}

/// Expand the first `{a,b,...}` group of `pattern`. Nested groups are not
/// supported.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };

    let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
    pattern[open + 1..close]
        .split(',')
        .map(|alternative| format!("{prefix}{alternative}{suffix}"))
        .collect()
}

fn compile(pattern: &str) -> Result<Vec<Pattern>> {
    expand_braces(pattern)
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| CloudError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn validate_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if valid {
        Ok(())
    } else {
        Err(CloudError::InvalidAssetPath(path.to_string()))
    }
}

/// Write through a sibling temp file so a reader never sees a partial asset.
/// Identical content on disk is left untouched.
async fn write_local(root: &Path, asset: &Asset) -> Result<()> {
    let target = root.join(&asset.path);
    if let Ok(existing) = fs::read(&target).await
        && existing == asset.content
    {
        return Ok(());
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut temp = target.clone().into_os_string();
    temp.push(".partial");
    let temp = PathBuf::from(temp);

    fs::write(&temp, &asset.content).await?;
    fs::rename(&temp, &target).await?;
    Ok(())
}
