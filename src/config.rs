//! Configuration loading.

use crate::operation::DEFAULT_BATCH_SIZE;
use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application directory name under the platform data/config dirs.
const APP_DIR: &str = "graphd";

/// Config file name within the config directory.
const CONFIG_FILE: &str = "config.yml";

/// Database file name within the data directory.
const DB_FILE: &str = "graph.db";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite graph database
    pub database: PathBuf,

    /// Maximum number of queued operations; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Page size for batch reads that do not give one
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            queue_capacity: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Load config from `path`, or from the default location when it exists,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    log::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Read and validate a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_yaml(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate YAML.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }
        if self.queue_capacity == Some(0) {
            bail!("queue_capacity must be greater than 0 when set");
        }
        Ok(())
    }
}

/// Default database location: `<data_local_dir>/graphd/graph.db`.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(DB_FILE)
}

/// Default config location: `<config_dir>/graphd/config.yml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
