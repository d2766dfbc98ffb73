//! Global Configuration (~/.charon/config.toml)
//!
//! Handles user-level configuration stored in `~/.charon/config.toml`.

use crate::project::LibrariesConfig;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.charon/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// User-wide library loading settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libraries: Option<LibrariesConfig>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        Ok(config)
    }

    /// Get the global config file path (~/.charon/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".charon").join("config.toml"))
    }

    /// User-wide search paths, empty when absent
    pub fn search_paths(&self) -> &[String] {
        self.libraries
            .as_ref()
            .map(|l| l.search_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Merge another global config into this one.
    /// Other config takes precedence for non-None values.
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.libraries.is_some() {
            self.libraries = other.libraries.clone();
        }
    }
}
