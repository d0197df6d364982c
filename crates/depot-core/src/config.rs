//! User configuration (`<home>/config.toml`).
//!
//! Every key is optional; a missing file yields the defaults. `DEPOT_STORE`
//! overrides the store root from the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths;

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    store: Option<PathBuf>,
    feeds: Option<PathBuf>,
    max_parallel_downloads: Option<usize>,
    solver_command: Option<Vec<String>>,
    solver_timeout_secs: Option<u64>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the implementation store.
    pub store: PathBuf,
    /// Directory holding cached feed documents.
    pub feeds: PathBuf,
    /// Upper bound on concurrent retrievals.
    pub max_parallel_downloads: usize,
    /// External solver program and leading arguments, tried after the
    /// built-in solver fails.
    pub solver_command: Option<Vec<String>>,
    /// Time limit for the external solver.
    pub solver_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: paths::store_path(),
            feeds: paths::feeds_path(),
            max_parallel_downloads: num_cpus::get().max(1),
            solver_command: None,
            solver_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load `<home>/config.toml`, applying environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&paths::config_path())?;
        if let Some(store) = std::env::var_os("DEPOT_STORE") {
            config.store = PathBuf::from(store);
        }
        Ok(config)
    }

    /// Load a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let defaults = Self::default();
        Ok(Self {
            store: file.store.unwrap_or(defaults.store),
            feeds: file.feeds.unwrap_or(defaults.feeds),
            max_parallel_downloads: file
                .max_parallel_downloads
                .unwrap_or(defaults.max_parallel_downloads)
                .max(1),
            solver_command: file.solver_command.filter(|argv| !argv.is_empty()),
            solver_timeout_secs: file.solver_timeout_secs.unwrap_or(defaults.solver_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "store = \"/srv/depot\"\nmax-parallel-downloads = 0\nsolver-command = [\"0install\", \"select\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store, PathBuf::from("/srv/depot"));
        assert_eq!(config.max_parallel_downloads, 1);
        assert_eq!(
            config.solver_command,
            Some(vec!["0install".to_string(), "select".to_string()])
        );
        assert_eq!(config.feeds, paths::feeds_path());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "store = [").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }
}
