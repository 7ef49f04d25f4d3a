//! TOML Configuration Management
//!
//! Reads and writes the coordinator configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::config::CoordinatorConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_coordinator_dir};

/// Configuration service for the coordinator settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: CoordinatorConfig,
}

impl ConfigService {
    /// Load the default config file, creating it with defaults if missing
    pub fn new() -> AppResult<Self> {
        ensure_coordinator_dir()?;
        Self::open(config_path()?)
    }

    /// Load a config file at `path`, creating it with defaults if missing
    pub fn open(config_path: PathBuf) -> AppResult<Self> {
        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "writing default coordinator config");
            let default_config = CoordinatorConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    fn load_from_file(path: &Path) -> AppResult<CoordinatorConfig> {
        let content = fs::read_to_string(path)?;
        let config: CoordinatorConfig = toml::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    fn save_to_file(path: &Path, config: &CoordinatorConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Replace the configuration and persist it
    pub fn update_config(&mut self, config: CoordinatorConfig) -> AppResult<&CoordinatorConfig> {
        Self::save_to_file(&self.config_path, &config)?;
        self.config = config;
        Ok(&self.config)
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }
}
