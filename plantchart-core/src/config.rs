//! Build and validation configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PLANTCHART_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IR builder options.
    pub build: BuildConfig,
    /// Validator options.
    pub validation: ValidationConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PLANTCHART_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.build.apply_env_overrides();
        self.validation.apply_env_overrides();
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// IR builder configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Normalize state identifiers to upper case.
    pub uppercase_names: bool,
}

impl BuildConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(upper) = std::env::var("PLANTCHART_UPPERCASE_NAMES") {
            self.uppercase_names = parse_flag(&upper);
        }
    }
}

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Run the warning-level determinism checks.
    pub determinism_checks: bool,
    /// Treat warnings as errors. On by default: a chart with any finding
    /// is unusable unless this is turned off.
    pub deny_warnings: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            determinism_checks: true,
            deny_warnings: true,
        }
    }
}

impl ValidationConfig {
    /// Warnings stay advisory: the chart is still usable and carries them in
    /// [`crate::ValidChart::warnings`].
    pub fn lenient() -> Self {
        Self {
            deny_warnings: false,
            ..Self::default()
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(checks) = std::env::var("PLANTCHART_DETERMINISM_CHECKS") {
            self.determinism_checks = parse_flag(&checks);
        }

        if let Ok(deny) = std::env::var("PLANTCHART_DENY_WARNINGS") {
            self.deny_warnings = parse_flag(&deny);
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.to_lowercase() == "true"
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
