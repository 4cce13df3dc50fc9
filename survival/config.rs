//! Engine and service configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) gives
//! the stock engine. Values are checked by `validate` before use.

use crate::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Numerical settings for fitting and prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_iterations: usize,
    /// Newton stops once the largest coefficient change drops below this.
    pub tolerance: f64,
    pub ridge_lambda: f64,
    /// Added to the information diagonal when the Cholesky factorization fails.
    pub singular_ridge_boost: f64,
    pub max_step_halvings: usize,
    pub min_samples: usize,
    /// Churn probability reported for an empty survival curve.
    pub neutral_churn_probability: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            ridge_lambda: 0.01,
            singular_ridge_boost: 0.1,
            max_step_halvings: 30,
            min_samples: 2,
            neutral_churn_probability: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.ridge_lambda.is_finite() && self.ridge_lambda >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "ridge_lambda must be non-negative, got {}",
                self.ridge_lambda
            )));
        }
        if !(self.singular_ridge_boost.is_finite() && self.singular_ridge_boost > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "singular_ridge_boost must be positive, got {}",
                self.singular_ridge_boost
            )));
        }
        if !(0.0..=1.0).contains(&self.neutral_churn_probability) {
            return Err(ConfigError::Invalid(format!(
                "neutral_churn_probability must lie in [0, 1], got {}",
                self.neutral_churn_probability
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

/// Everything a service or the CLI reads from its config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub retention: RetentionPolicy,
}

impl Settings {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(contents)?;
        settings.engine.validate()?;
        settings.retention.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let settings = Self::from_toml_str(&contents)?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(settings)
    }
}
