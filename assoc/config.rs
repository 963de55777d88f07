use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Settings shared by every per-variant fit in a scan.
///
/// Any field left out of a TOML file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Tolerance for the BFGS gradient and for the Newton-Raphson step on the
    /// variant coefficient.
    pub convergence_limit: f64,
    /// Newton-Raphson iteration cap, applied separately to plain and Firth modes.
    pub max_nr_iterations: usize,
    /// Iteration cap for the BFGS maximizer.
    pub bfgs_max_iterations: usize,
    /// Variants present in fewer than this fraction of samples are skipped.
    pub min_frequency: f64,
    /// Variants present in more than this fraction of samples are skipped.
    pub max_frequency: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            convergence_limit: 1.0e-5,
            max_nr_iterations: 25,
            bfgs_max_iterations: 200,
            min_frequency: 0.01,
            max_frequency: 0.99,
        }
    }
}

impl FitConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.convergence_limit.is_finite() && self.convergence_limit > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "convergence_limit must be positive, got {}",
                self.convergence_limit
            )));
        }
        if self.max_nr_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_nr_iterations must be at least 1".to_string(),
            ));
        }
        if self.bfgs_max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "bfgs_max_iterations must be at least 1".to_string(),
            ));
        }
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.min_frequency)
            || !in_unit(self.max_frequency)
            || self.min_frequency > self.max_frequency
        {
            return Err(ConfigError::Invalid(format!(
                "frequency bounds must satisfy 0 <= min <= max <= 1, got [{}, {}]",
                self.min_frequency, self.max_frequency
            )));
        }
        Ok(())
    }

    /// Whether a variant at this presence frequency should be fitted.
    pub fn passes_frequency_filter(&self, frequency: f64) -> bool {
        frequency >= self.min_frequency && frequency <= self.max_frequency
    }
}
