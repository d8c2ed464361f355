// Store configuration loaded from config.yaml

use crate::models::Priority;
use crate::store::DEFAULT_STORAGE_KEY;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const CONFIG_FILE: &str = "config.yaml";

/// Which slot implementation holds the task list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    File,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::File => write!(f, "file"),
        }
    }
}

impl FromStr for Backend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "file" => Ok(Backend::File),
            other => Err(eyre!("Unknown backend: {} (expected sqlite or file)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Backend,
    pub storage_key: String,
    /// Priority used by `add` when none is given
    pub default_priority: Priority,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            default_priority: Priority::default(),
        }
    }
}

impl Config {
    /// Load `config.yaml` from the store directory, defaults if absent
    pub fn load<P: AsRef<Path>>(store_dir: P) -> Result<Self> {
        let path = store_dir.as_ref().join(CONFIG_FILE);
        if !path.exists() {
            debug!(?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read config file {:?}", path))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))?;
        crate::slot::validate_key(&config.storage_key)
            .with_context(|| format!("Invalid storage_key in {:?}", path))?;
        Ok(config)
    }
}

/// Store directory used when none is given: `<data dir>/todostore`
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("todostore"))
        .unwrap_or_else(|| PathBuf::from(".todostore"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.storage_key, "taskManager_tasks");
        assert_eq!(config.backend, Backend::Sqlite);
    }

    #[test]
    fn test_partial_config() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "backend: file\ndefault_priority: high\n").unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.default_priority, Priority::High);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "backend: [nope").unwrap();
        assert!(Config::load(temp.path()).is_err());

        fs::write(temp.path().join(CONFIG_FILE), "colour: blue\n").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn test_invalid_storage_key() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "storage_key: \"../x\"\n").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("SQLite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("file".parse::<Backend>().unwrap(), Backend::File);
        assert!("redis".parse::<Backend>().is_err());
        assert_eq!(Backend::File.to_string(), "file");
    }
}
