//! Project Configuration (charon.toml)
//!
//! Handles project-level configuration stored in `charon.toml` next to
//! the embedding project.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name probed in the project directory
pub const PROJECT_FILE: &str = "charon.toml";

/// Project configuration from charon.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Library loading settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libraries: Option<LibrariesConfig>,

    /// Operation manifest settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifests: Option<ManifestsConfig>,
}

/// Library loading settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibrariesConfig {
    /// Extra search paths, highest priority first
    #[serde(default)]
    pub search_paths: Vec<String>,
}

/// Operation manifest settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ManifestsConfig {
    /// Manifest files to register at bridge creation, in order
    #[serde(default)]
    pub paths: Vec<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(libraries) = &self.libraries {
            for entry in &libraries.search_paths {
                if entry.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "libraries.search_paths".to_string(),
                        reason: "empty path entry".to_string(),
                    });
                }
            }
        }
        if let Some(manifests) = &self.manifests {
            for entry in &manifests.paths {
                if entry.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "manifests.paths".to_string(),
                        reason: "empty path entry".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Configured search paths, empty when absent
    pub fn search_paths(&self) -> &[String] {
        self.libraries
            .as_ref()
            .map(|l| l.search_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Configured manifest paths, empty when absent
    pub fn manifest_paths(&self) -> &[String] {
        self.manifests
            .as_ref()
            .map(|m| m.paths.as_slice())
            .unwrap_or(&[])
    }
}
