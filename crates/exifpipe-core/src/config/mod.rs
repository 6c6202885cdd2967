//! Configuration management for exifpipe.
//!
//! Configuration is loaded from a TOML file with sensible defaults. Once
//! loaded (and any command-line overrides applied) it is frozen behind an
//! `Arc` and handed read-only to every stage's `init`.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration structure for exifpipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Named stage chains
    pub pipelines: BTreeMap<String, Vec<String>>,

    /// Channel settings
    pub pipeline: PipelineConfig,

    /// Worker ceiling
    pub throttle: ThrottleConfig,

    /// Ingestion settings
    pub input: InputConfig,

    /// Tag normalization rules
    pub normalize: NormalizeConfig,

    /// Filter stage settings
    pub filter: FilterConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Document store settings
    pub store: StoreConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            pipelines: default_pipelines(),
            pipeline: PipelineConfig::default(),
            throttle: ThrottleConfig::default(),
            input: InputConfig::default(),
            normalize: NormalizeConfig::default(),
            filter: FilterConfig::default(),
            output: OutputConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.exifpipe.exifpipe/config.toml
    /// - Linux: ~/.config/exifpipe/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\exifpipe\config\config.toml
    ///
    /// Falls back to ~/.exifpipe/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "exifpipe", "exifpipe")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".exifpipe").join("config.toml")
            })
    }

    /// Look up a chain's stage names.
    pub fn chain(&self, name: &str) -> Result<&[String], ConfigError> {
        self.pipelines
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::UnknownChain(name.to_string()))
    }

    /// Resolved document store directory (with ~ expansion).
    pub fn store_dir(&self) -> PathBuf {
        expand_path(&self.store.path)
    }

    /// Resolved output file (with ~ expansion), if one is configured.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output
            .path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(expand_path)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Expand a leading `~` in a path.
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}
