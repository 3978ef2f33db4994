//! Configuration File Management
//!
//! Reads and writes the engine configuration as TOML or JSON, chosen by the
//! file extension (`.json` is JSON, anything else is TOML).

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::config::EngineConfig;
use crate::utils::error::{AppError, AppResult};

/// On-disk format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a path's extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Configuration service bound to one file
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: EngineConfig,
}

impl ConfigService {
    /// Open a config file, writing defaults first if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            if let Some(parent) = config_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let default_config = EngineConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load and validate configuration from a file
    pub fn load_from_file(path: &Path) -> AppResult<EngineConfig> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, format: ConfigFormat) -> AppResult<EngineConfig> {
        let config: EngineConfig = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(path: &Path, config: &EngineConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| AppError::config(format!("Failed to serialize config: {}", e)))?,
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration and persist it
    pub fn update_config(&mut self, config: EngineConfig) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &config)?;
        self.config = config;
        Ok(())
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
