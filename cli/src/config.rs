//! Configuration file support — `~/.relay/config.yaml` supplies defaults
//! for connection flags; explicit flags always win.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Default values for deploy/status connection flags.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Path to the config file (`~/.relay/config.yaml`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".relay").join("config.yaml"))
}

/// Load configuration from `path`. A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config = load(&dir.path().join("config.yaml")).expect("load");
        assert!(config.defaults.host.is_none());
        assert!(config.defaults.port.is_none());
    }

    #[test]
    fn load_parses_partial_yaml() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "defaults:\n  host: 203.0.113.10\n  user: ubuntu\n  port: 8000\n",
        )
        .expect("write");
        let config = load(&path).expect("load");
        assert_eq!(config.defaults.host.as_deref(), Some("203.0.113.10"));
        assert_eq!(config.defaults.user.as_deref(), Some("ubuntu"));
        assert_eq!(config.defaults.port, Some(8000));
        assert!(config.defaults.domain.is_none());
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "defaults: [not, a, map").expect("write");
        assert!(load(&path).is_err());
    }

    #[test]
    fn empty_file_yields_defaults_via_serde_default() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "{}").expect("write");
        let config = load(&path).expect("load");
        assert!(config.defaults.remote_root.is_none());
    }
}
