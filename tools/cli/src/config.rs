//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use credvault_crypto::KdfParams;

/// Environment variable overriding the database path.
pub const DATABASE_ENV_VAR: &str = "CREDVAULT_DB";

const APP_DIRNAME: &str = "credvault";
const CONFIG_FILENAME: &str = "config.json";
const DATABASE_FILENAME: &str = "vault.db";

/// Settings read from `config.json`.
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// SQLite database holding settings and credentials.
    pub database: PathBuf,
    /// KDF used when creating the vault or rotating its password.
    pub kdf: KdfParams,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: default_data_dir().join(DATABASE_FILENAME),
            kdf: KdfParams::default(),
        }
    }
}

impl CliConfig {
    /// Load from `path`, or from the default location if `None`.
    ///
    /// A missing file yields the defaults. `CREDVAULT_DB` overrides the
    /// database path either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        let config = Self::from_file(&path)?;
        Ok(config.with_database_override(std::env::var(DATABASE_ENV_VAR).ok()))
    }

    /// Read `path`, falling back to the defaults if it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Replace the database path with `database` unless it is unset or empty.
    pub fn with_database_override(mut self, database: Option<String>) -> Self {
        if let Some(database) = database.filter(|d| !d.is_empty()) {
            self.database = PathBuf::from(database);
        }
        self
    }
}

/// `<config_dir>/credvault/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIRNAME)
        .join(CONFIG_FILENAME)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIRNAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::from_file(&dir.path().join("absent.json")).unwrap();

        assert_eq!(config, CliConfig::default());
        assert!(config.database.ends_with("vault.db"));
    }

    #[test]
    fn test_database_override() {
        let config = CliConfig::default();

        let overridden = config
            .clone()
            .with_database_override(Some("/tmp/other.db".to_string()));
        assert_eq!(overridden.database, PathBuf::from("/tmp/other.db"));
        assert_eq!(overridden.kdf, config.kdf);

        assert_eq!(config.clone().with_database_override(Some(String::new())), config);
        assert_eq!(config.clone().with_database_override(None), config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"kdf":{"algorithm":"pbkdf2-sha256","iterations":250000}}"#,
        )
        .unwrap();

        let config = CliConfig::from_file(&path).unwrap();
        assert_eq!(config.kdf, KdfParams::pbkdf2(250_000));
        assert_eq!(config.database, CliConfig::default().database);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(CliConfig::from_file(&path).is_err());
    }
}
