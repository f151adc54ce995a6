//! Bridge configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/bridge.toml` by default)
//! 2. environment variables prefixed with `BECKHOFF_BRIDGE_`, with `__`
//!    separating nested keys
//!
//! # Example
//! ```no_run
//! use beckhoff_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), beckhoff_bridge::config::ConfigLoadError>(())
//! ```
//!
//! Override a single field from the environment:
//!
//! ```text
//! BECKHOFF_BRIDGE_APPLICATION__LOG_LEVEL=debug
//! ```

use bridge_core::config::{MAX_REFRESH_MS, MIN_REFRESH_MS};
use bridge_core::{PlcConfig, PlcDefaults};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BECKHOFF_BRIDGE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    /// Configuration file does not exist
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// File could not be read or parsed, or a field has the wrong type
    #[error("Failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    /// Loaded configuration is inconsistent
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Defaults for PLCs created on demand
    #[serde(default)]
    pub defaults: PlcDefaults,
    /// PLCs started at launch
    #[serde(default)]
    pub plcs: Vec<PlcConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_name() -> String {
    "Beckhoff Bridge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl BridgeConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` and the environment, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading bridge configuration");

        let config: BridgeConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;

        info!(
            path = %path.display(),
            plcs = config.plcs.len(),
            "loaded bridge configuration"
        );
        Ok(config)
    }

    /// Parse and validate TOML text, without the environment layer.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigLoadError> {
        let config: BridgeConfig = Figment::new().merge(Toml::string(text)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for plc in &self.plcs {
            plc.validate()
                .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
            if !names.insert(plc.name.as_str()) {
                return Err(ConfigLoadError::Validation(format!(
                    "Duplicate PLC name: {}",
                    plc.name
                )));
            }
            if !(MIN_REFRESH_MS..=MAX_REFRESH_MS).contains(&plc.refresh_ms) {
                warn!(
                    plc = %plc.name,
                    refresh_ms = plc.refresh_ms,
                    applied = plc.effective_refresh_ms(),
                    "refresh_ms out of range, will be clamped"
                );
            }
        }

        Ok(())
    }

    /// PLCs configured as enabled.
    pub fn enabled_plcs(&self) -> Vec<&PlcConfig> {
        self.plcs.iter().filter(|plc| plc.enabled).collect()
    }
}
