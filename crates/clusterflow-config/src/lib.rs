pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{AwsSettings, Binaries, ClusterflowConfig};

use std::path::{Path, PathBuf};

/// Explicit configuration file path.
pub const CONFIG_PATH_ENV: &str = "CLUSTERFLOW_CONFIG_PATH";

const PROJECT_CONFIG: &str = "clusterflow.yaml";
const GLOBAL_CONFIG: &str = "config.yaml";

/// `~/.config/clusterflow` (platform equivalent), if the platform has one.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clusterflow"))
}

/// Locate the configuration file.
///
/// Search order:
/// 1. `CLUSTERFLOW_CONFIG_PATH` (must exist when set)
/// 2. `./clusterflow.yaml`
/// 3. `<config dir>/clusterflow/config.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path));
        }
        return Ok(Some(path));
    }

    let project = std::env::current_dir()?.join(PROJECT_CONFIG);
    if project.exists() {
        return Ok(Some(project));
    }

    if let Some(dir) = config_dir() {
        let global = dir.join(GLOBAL_CONFIG);
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Load the discovered configuration, or defaults when there is none.
pub fn load_config() -> Result<ClusterflowConfig> {
    match find_config_file()? {
        Some(path) => load_from(&path),
        None => {
            tracing::debug!("No configuration file found, using defaults");
            Ok(ClusterflowConfig::default())
        }
    }
}

pub fn load_from(path: &Path) -> Result<ClusterflowConfig> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(ClusterflowConfig::default());
    }

    let config = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ClusterflowConfig::default();
        assert_eq!(config.work_root(), std::env::temp_dir());
        assert_eq!(config.assets_dir, PathBuf::from("."));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.grace_period(), Duration::from_secs(180));
        assert_eq!(config.binaries.kops, "kops");
        assert_eq!(
            config.client_authentication_api_version,
            "client.authentication.k8s.io/v1beta1"
        );
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("clusterflow.yaml");
        fs::write(
            &path,
            "work_root: /var/lib/clusterflow\n\
             poll_interval_secs: 5\n\
             binaries:\n  kops: /opt/kops/bin/kops\n\
             aws:\n  profile: ops\n",
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.work_root(), PathBuf::from("/var/lib/clusterflow"));
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.grace_period_secs, 180);
        assert_eq!(config.binaries.kops, "/opt/kops/bin/kops");
        assert_eq!(config.binaries.terraform, "terraform");
        assert_eq!(config.aws.profile.as_deref(), Some("ops"));
        assert_eq!(config.aws.region, None);
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("clusterflow.yaml");
        fs::write(&path, "\n").unwrap();
        assert_eq!(load_from(&path).unwrap(), ClusterflowConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("clusterflow.yaml");
        fs::write(&path, "poll_interval_secs: soon\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));

        fs::write(&path, "pol_interval_secs: 5\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "verbose: true\n").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), || {
            assert_eq!(find_config_file().unwrap(), Some(config_path.clone()));
            assert!(load_config().unwrap().verbose);
        });
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var_missing() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("/nonexistent/clusterflow.yaml"), || {
            assert!(matches!(
                find_config_file(),
                Err(ConfigError::ConfigFileNotFound(_))
            ));
        });
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join(PROJECT_CONFIG), "grace_period_secs: 60\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            (find_config_file().unwrap(), load_config().unwrap())
        });
        std::env::set_current_dir(original_dir).unwrap();

        let (path, config) = result;
        assert!(path.unwrap().ends_with(PROJECT_CONFIG));
        assert_eq!(config.grace_period(), Duration::from_secs(60));
    }
}
