//! Charon Configuration System
//!
//! Provides configuration management for bridge embedders including:
//! - Project configuration (charon.toml)
//! - Global user configuration (~/.charon/config.toml)
//! - Environment overrides (CHARON_LIBRARY_PATH)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later
//! overrides earlier):
//! 1. Global config (~/.charon/config.toml)
//! 2. Project config (./charon.toml)
//! 3. Environment variables (CHARON_*)
//!
//! # Example
//!
//! ```no_run
//! use charon_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let settings = loader.load_from_directory(Path::new(".")).unwrap();
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{BridgeSettings, ConfigLoader};
pub use project::ProjectConfig;
