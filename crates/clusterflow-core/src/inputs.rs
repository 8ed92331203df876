//! Resolved input set
//!
//! Inputs arrive as JSON object files. Each file is one input source with an
//! identifier derived from its name; the identifiers become var-file
//! references for the infra applier and the merged values feed the
//! execution context.

use crate::error::{CoreError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Directory (relative to the working directory) holding staged var files.
pub const VAR_FILE_DIR: &str = "tf_vars";

const VAR_FILE_SUFFIX: &str = ".tfvars.json";

/// One input file.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSource {
    id: String,
    values: Map<String, Value>,
}

impl InputSource {
    pub fn new(id: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Read an input file; the file must hold a JSON object.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| CoreError::InvalidInput {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        match value {
            Value::Object(values) => Ok(Self::new(input_id(path), values)),
            _ => Err(CoreError::InvalidInput {
                path: path.to_path_buf(),
                message: "expected a JSON object".to_string(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Path of the staged var file, relative to the working directory.
    pub fn var_file_path(&self) -> String {
        var_file_path(&self.id)
    }

    /// Content written to the staged var file.
    pub fn to_var_file(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.values)?)
    }
}

/// Inputs for one run. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSet {
    sources: Vec<InputSource>,
    values: BTreeMap<String, Value>,
}

impl InputSet {
    /// Merge sources in order. A later source with the same id replaces the
    /// earlier one; a later value for the same key wins.
    pub fn from_sources(sources: impl IntoIterator<Item = InputSource>) -> Self {
        let mut deduped: Vec<InputSource> = Vec::new();
        for source in sources {
            match deduped.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source,
                None => deduped.push(source),
            }
        }

        let mut values = BTreeMap::new();
        for source in &deduped {
            for (key, value) in &source.values {
                values.insert(key.clone(), value.clone());
            }
        }

        Self {
            sources: deduped,
            values,
        }
    }

    /// Re-read the var files left in `work_dir` by a previous run.
    pub fn from_work_dir(work_dir: &Path) -> Result<Self> {
        let dir = work_dir.join(VAR_FILE_DIR);
        if !dir.is_dir() {
            tracing::debug!("No previous inputs in {}", dir.display());
            return Ok(Self::default());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| CoreError::io(&dir, e))? {
            let path = entry.map_err(|e| CoreError::io(&dir, e))?.path();
            let is_var_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(VAR_FILE_SUFFIX));
            if is_var_file {
                paths.push(path);
            }
        }
        paths.sort();

        let sources = paths
            .iter()
            .map(|p| InputSource::read(p))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Loaded {} previous input files", sources.len());
        Ok(Self::from_sources(sources))
    }

    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Merged values, sorted by key.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Absolute var-file paths for the applier, in source order.
    pub fn var_files(&self, work_dir: &Path) -> Vec<std::path::PathBuf> {
        self.ids()
            .map(|id| work_dir.join(var_file_path(id)))
            .collect()
    }
}

pub fn var_file_path(id: &str) -> String {
    format!("{VAR_FILE_DIR}/{id}{VAR_FILE_SUFFIX}")
}

/// Identifier for an input file: its name without `.json` / `.tfvars`,
/// with anything outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn input_id(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input");
    let stem = name
        .strip_suffix(VAR_FILE_SUFFIX)
        .or_else(|| name.strip_suffix(".json"))
        .unwrap_or(name);
    let stem = stem.strip_suffix(".tfvars").unwrap_or(stem);

    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
