//! Configuration management for vmprobe

pub mod schema;

pub use schema::Config;

use crate::error::{InspectError, InspectResult};
use crate::session::Credentials;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vmprobe")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vmprobe")
    }

    /// Get the default durable store directory
    pub fn inspections_dir() -> PathBuf {
        Self::state_dir().join("inspections")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> InspectResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> InspectResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| InspectError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| InspectError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> InspectResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                InspectError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            InspectError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Durable store directory, if the store is enabled
    pub fn store_dir(&self) -> Option<PathBuf> {
        if !self.store.enabled {
            return None;
        }
        Some(
            self.store
                .dir
                .clone()
                .unwrap_or_else(ConfigManager::inspections_dir),
        )
    }

    /// vCenter credentials, reading the password from the configured
    /// environment variable
    pub fn credentials(&self) -> Credentials {
        let password = std::env::var(&self.vcenter.password_env).unwrap_or_default();
        Credentials {
            vcenter_url: self.vcenter.url.clone(),
            username: self.vcenter.username.clone(),
            password,
        }
    }
}
