//! Application configuration.
//!
//! Stored as JSON at `<config dir>/mailsync/config.json`. A missing file
//! means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::account::master_key;
use crate::sync::WindowConfig;
use crate::{Error, Result};

/// Environment variable that overrides the configured encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "MAILSYNC_ENCRYPTION_KEY";

const APP_DIR: &str = "mailsync";

/// Settings for the store, the vault and sync passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Secret the vault key is derived from. When unset, a master key is
    /// kept in the OS keyring.
    pub encryption_key: Option<String>,
    /// Window for full passes.
    pub full_sync_window: usize,
    /// Window for incremental passes.
    pub incremental_window: usize,
    /// TCP and TLS connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-command timeout, in seconds.
    pub io_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            encryption_key: None,
            full_sync_window: 1000,
            incremental_window: 50,
            connect_timeout_secs: 30,
            io_timeout_secs: 120,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("mailsync.db")
}

impl Config {
    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Loads the config, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes the config, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// Window sizes for sync passes.
    #[must_use]
    pub const fn window(&self) -> WindowConfig {
        WindowConfig {
            full: self.full_sync_window,
            incremental: self.incremental_window,
        }
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-command timeout.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Picks the vault secret: environment, then config, then the keyring.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the keyring is unavailable.
    pub fn resolve_encryption_key(&self) -> Result<String> {
        let from_env = std::env::var(ENCRYPTION_KEY_ENV).ok();
        self.resolve_key_from(from_env)
    }

    fn resolve_key_from(&self, from_env: Option<String>) -> Result<String> {
        let key = match from_env.or_else(|| self.encryption_key.clone()) {
            Some(key) => key,
            None => master_key::load_or_create_master_key()?,
        };

        if key.is_empty() {
            return Err(Error::Config("encryption key is empty".to_string()));
        }
        Ok(key)
    }

    /// Checks that the window sizes and timeouts are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.full_sync_window == 0 {
            return Err(Error::Config("full_sync_window must be positive".to_string()));
        }
        if self.incremental_window == 0 {
            return Err(Error::Config(
                "incremental_window must be positive".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.io_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("mailsync-config-{}", uuid::Uuid::new_v4()))
            .join("config.json")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.window(), WindowConfig::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.io_timeout(), Duration::from_secs(120));
        assert!(config.database_path.ends_with("mailsync/mailsync.db"));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let config = Config::load(&temp_path()).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = temp_path();
        let config = Config {
            encryption_key: Some("secret".to_string()),
            incremental_window: 25,
            ..Config::default()
        };
        config.save(&path).await.unwrap();

        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"full_sync_window": 10}"#).unwrap();
        assert_eq!(config.full_sync_window, 10);
        assert_eq!(config.incremental_window, 50);
    }

    #[test]
    fn test_key_precedence() {
        let config = Config {
            encryption_key: Some("from-config".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_key_from(Some("from-env".to_string())).unwrap(),
            "from-env"
        );
        assert_eq!(config.resolve_key_from(None).unwrap(), "from-config");

        let empty = Config {
            encryption_key: Some(String::new()),
            ..Config::default()
        };
        assert!(matches!(
            empty.resolve_key_from(None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = Config {
            incremental_window: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
