//! Configuration loading and the persisted-state layout.
//!
//! Resolution order, first match wins:
//!
//! 1. CLI argument (`mnemo --config /path/to/config.toml`)
//! 2. `MNEMO_CONFIG_PATH` environment variable
//! 3. `~/.config/mnemo/config.toml`
//! 4. Built-in defaults
//!
//! State lives under a single base directory (default `~/.mnemo`,
//! override `MNEMO_DATA_DIR`): `memory/memory.db`, `strategies/`, and the
//! per-session analysis state under the OS temp dir.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Logging settings from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Log level (`error`, `warn`, `info`, `debug`, `trace`) or a full
    /// filter directive.
    pub level: Option<String>,
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    sessions_dir: Option<PathBuf>,
    #[serde(default)]
    logging: LoggingSettings,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct MnemoConfig {
    /// Base directory for persistent state.
    pub data_dir: PathBuf,
    /// Root directory for analysis sessions.
    pub sessions_dir: PathBuf,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl MnemoConfig {
    /// Loads configuration from an explicit file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the file is missing or
    /// malformed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::op("read_config", e))?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|e| Error::op("parse_config", e))?;
        Ok(Self::from_file(file))
    }

    /// Loads configuration from the default locations, falling back to
    /// built-in defaults.
    #[must_use]
    pub fn load_default() -> Self {
        let default_path = home_dir().join(".config").join("mnemo").join("config.toml");
        if default_path.is_file() {
            if let Ok(config) = Self::load_from_file(&default_path) {
                return config;
            }
        }
        Self::from_file(ConfigFile::default())
    }

    fn from_file(file: ConfigFile) -> Self {
        let data_dir = std::env::var_os("MNEMO_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| home_dir().join(".mnemo"));
        let sessions_dir = file
            .sessions_dir
            .unwrap_or_else(crate::session::SessionStore::default_root);

        Self {
            data_dir,
            sessions_dir,
            logging: file.logging,
        }
    }

    /// Directory of the memory database.
    #[must_use]
    pub fn memory_dir(&self) -> PathBuf {
        self.data_dir.join("memory")
    }

    /// Directory of the strategy store.
    #[must_use]
    pub fn strategies_dir(&self) -> PathBuf {
        self.data_dir.join("strategies")
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolves configuration the way the binary does: CLI flag, then env
/// var, then defaults.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when an explicitly named file
/// cannot be loaded.
pub fn resolve(cli_path: Option<&str>) -> Result<MnemoConfig> {
    if let Some(path) = cli_path {
        return MnemoConfig::load_from_file(Path::new(path));
    }
    if let Ok(path) = std::env::var("MNEMO_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return MnemoConfig::load_from_file(Path::new(&path));
        }
    }
    Ok(MnemoConfig::load_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_file_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "data_dir = \"/srv/mnemo\"\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
        )
        .unwrap();

        let config = MnemoConfig::load_from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/mnemo"));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.memory_dir(), PathBuf::from("/srv/mnemo/memory"));
        assert_eq!(
            config.strategies_dir(),
            PathBuf::from("/srv/mnemo/strategies")
        );
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not [valid toml").unwrap();
        assert!(MnemoConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_defaults_have_expected_shape() {
        let config = MnemoConfig::load_default();
        assert!(config.data_dir.to_string_lossy().contains("mnemo") || config.data_dir.ends_with(".mnemo"));
        assert!(config.sessions_dir.ends_with("mnemo-sessions"));
    }
}
