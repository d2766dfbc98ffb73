//! Configuration loading and layering
//!
//! `ConfigLoader` resolves the effective bridge settings for a project
//! directory: global user config first, project config over it, and the
//! `CHARON_LIBRARY_PATH` environment variable on top. Relative paths in
//! the project file resolve against the project directory.

use crate::global::GlobalConfig;
use crate::project::{ProjectConfig, PROJECT_FILE};
use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment variable holding extra library search paths
/// (platform path-separator separated, highest priority).
pub const LIBRARY_PATH_ENV: &str = "CHARON_LIBRARY_PATH";

/// Resolved settings handed to the bridge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BridgeSettings {
    /// Library search paths, highest priority first
    pub search_paths: Vec<PathBuf>,
    /// Operation manifests to register, in order
    pub manifest_paths: Vec<PathBuf>,
}

/// Loads and layers configuration sources.
#[derive(Default)]
pub struct ConfigLoader {
    /// Override for the global config location (tests)
    global_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { global_path: None }
    }

    /// Use an explicit global config path instead of
    /// `~/.charon/config.toml`.
    pub fn with_global_path(path: PathBuf) -> Self {
        Self {
            global_path: Some(path),
        }
    }

    /// Resolve effective settings for a project directory.
    ///
    /// Precedence, highest first: `CHARON_LIBRARY_PATH`, the project's
    /// `charon.toml`, the global config. A missing file at any layer is
    /// simply skipped; a malformed one is an error.
    pub fn load_from_directory(&self, dir: &Path) -> ConfigResult<BridgeSettings> {
        let mut search_paths: Vec<PathBuf> = Vec::new();
        let mut manifest_paths: Vec<PathBuf> = Vec::new();

        // Environment override wins
        if let Ok(raw) = std::env::var(LIBRARY_PATH_ENV) {
            search_paths.extend(std::env::split_paths(&raw));
        }

        // Project layer
        let project_file = dir.join(PROJECT_FILE);
        match ProjectConfig::load_from_file(&project_file) {
            Ok(project) => {
                for entry in project.search_paths() {
                    search_paths.push(resolve_against(dir, entry));
                }
                for entry in project.manifest_paths() {
                    manifest_paths.push(resolve_against(dir, entry));
                }
            }
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        // Global layer
        let global_file = match &self.global_path {
            Some(path) => path.clone(),
            None => GlobalConfig::global_config_path()?,
        };
        match GlobalConfig::load_from_file(&global_file) {
            Ok(global) => {
                for entry in global.search_paths() {
                    search_paths.push(PathBuf::from(entry));
                }
            }
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        Ok(BridgeSettings {
            search_paths,
            manifest_paths,
        })
    }
}

fn resolve_against(dir: &Path, entry: &str) -> PathBuf {
    let path = PathBuf::from(entry);
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    #[serial]
    fn empty_directory_yields_empty_settings() {
        std::env::remove_var(LIBRARY_PATH_ENV);
        let dir = tempdir().unwrap();
        let missing_global = dir.path().join("no-global.toml");
        let loader = ConfigLoader::with_global_path(missing_global);

        let settings = loader.load_from_directory(dir.path()).unwrap();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    #[serial]
    fn project_paths_resolve_against_directory() {
        std::env::remove_var(LIBRARY_PATH_ENV);
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            PROJECT_FILE,
            r#"
[libraries]
search_paths = ["native", "/abs/lib"]

[manifests]
paths = ["ops.json"]
"#,
        );
        let loader = ConfigLoader::with_global_path(dir.path().join("no-global.toml"));

        let settings = loader.load_from_directory(dir.path()).unwrap();
        assert_eq!(
            settings.search_paths,
            vec![dir.path().join("native"), PathBuf::from("/abs/lib")]
        );
        assert_eq!(settings.manifest_paths, vec![dir.path().join("ops.json")]);
    }

    #[test]
    #[serial]
    fn env_paths_take_priority_over_project() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            PROJECT_FILE,
            r#"
[libraries]
search_paths = ["native"]
"#,
        );
        std::env::set_var(LIBRARY_PATH_ENV, "/env/lib");
        let loader = ConfigLoader::with_global_path(dir.path().join("no-global.toml"));

        let settings = loader.load_from_directory(dir.path()).unwrap();
        std::env::remove_var(LIBRARY_PATH_ENV);

        assert_eq!(settings.search_paths[0], PathBuf::from("/env/lib"));
        assert_eq!(settings.search_paths[1], dir.path().join("native"));
    }

    #[test]
    #[serial]
    fn global_paths_come_last() {
        std::env::remove_var(LIBRARY_PATH_ENV);
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            PROJECT_FILE,
            r#"
[libraries]
search_paths = ["native"]
"#,
        );
        let global = write(
            dir.path(),
            "global.toml",
            r#"
[libraries]
search_paths = ["/user/lib"]
"#,
        );
        let loader = ConfigLoader::with_global_path(global);

        let settings = loader.load_from_directory(dir.path()).unwrap();
        assert_eq!(
            settings.search_paths,
            vec![dir.path().join("native"), PathBuf::from("/user/lib")]
        );
    }

    #[test]
    #[serial]
    fn malformed_project_file_is_an_error() {
        std::env::remove_var(LIBRARY_PATH_ENV);
        let dir = tempdir().unwrap();
        write(dir.path(), PROJECT_FILE, "not [valid toml");
        let loader = ConfigLoader::with_global_path(dir.path().join("no-global.toml"));

        let result = loader.load_from_directory(dir.path());
        assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
    }
}
