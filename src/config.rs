//! Host Configuration
//!
//! Handles parsing and management of hostlink.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file searched for by [`HostlinkConfig::find_and_load`]
pub const CONFIG_FILE: &str = "hostlink.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching hostlink.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostlinkConfig {
    /// Module library to load
    #[serde(default)]
    pub module: ModuleConfig,

    /// Host behaviour
    #[serde(default)]
    pub host: HostConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostlinkConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: HostlinkConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directories searched for the module: configured ones first, then the
    /// platform defaults.
    pub fn module_search_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.module.search_paths.iter().map(PathBuf::from).collect();
        paths.extend(crate::ffi::default_search_paths());
        paths
    }
}

/// Module library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Library name, expanded to the platform file name when searching
    #[serde(default = "default_module_name")]
    pub name: String,

    /// Explicit path to the library; skips the search
    #[serde(default)]
    pub path: Option<String>,

    /// Extra directories to search
    #[serde(default)]
    pub search_paths: Vec<String>,
}

fn default_module_name() -> String {
    "hostlink".to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: default_module_name(),
            path: None,
            search_paths: Vec::new(),
        }
    }
}

/// Host behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Pass the host image handle to `hl_bootstrap`
    #[serde(default = "default_true")]
    pub bootstrap: bool,

    /// Text sent through Print and EchoString by `hl run`
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_true() -> bool {
    true
}

fn default_message() -> String {
    "Test".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bootstrap: true,
            message: default_message(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}
