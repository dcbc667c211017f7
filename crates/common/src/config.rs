use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ForecastError, Horizon, Result};

/// Application-level configuration, mirrors config/app_config.yaml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.forecast.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon_start")]
    pub horizon_start: i32,
    #[serde(default = "default_horizon_end")]
    pub horizon_end: i32,

    /// Fraction applied symmetrically around the base forecast.
    #[serde(default = "default_scenario_adjustment")]
    pub scenario_adjustment: f64,

    #[serde(default = "default_min_primary_points")]
    pub min_primary_points: usize,
    #[serde(default = "default_min_fallback_points")]
    pub min_fallback_points: usize,
    #[serde(default = "default_degenerate_std_threshold")]
    pub degenerate_std_threshold: f64,

    #[serde(default = "default_true")]
    pub clamp_primary: bool,
    #[serde(default = "default_true")]
    pub primary_enabled: bool,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_start: default_horizon_start(),
            horizon_end: default_horizon_end(),
            scenario_adjustment: default_scenario_adjustment(),
            min_primary_points: default_min_primary_points(),
            min_fallback_points: default_min_fallback_points(),
            degenerate_std_threshold: default_degenerate_std_threshold(),
            clamp_primary: true,
            primary_enabled: true,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl ForecastConfig {
    pub fn horizon(&self) -> Result<Horizon> {
        Horizon::new(self.horizon_start, self.horizon_end)
    }

    pub fn validate(&self) -> Result<()> {
        self.horizon()
            .map_err(|e| ForecastError::Config(e.to_string()))?;

        if !(0.0..1.0).contains(&self.scenario_adjustment) {
            return Err(ForecastError::Config(format!(
                "scenario_adjustment must be in [0, 1), got {}",
                self.scenario_adjustment
            )));
        }
        if self.min_fallback_points < 2 {
            return Err(ForecastError::Config(
                "min_fallback_points must be at least 2 to fit a line".into(),
            ));
        }
        if self.min_primary_points < self.min_fallback_points {
            return Err(ForecastError::Config(format!(
                "min_primary_points ({}) must not be below min_fallback_points ({})",
                self.min_primary_points, self.min_fallback_points
            )));
        }
        if self.degenerate_std_threshold.is_nan() || self.degenerate_std_threshold < 0.0 {
            return Err(ForecastError::Config(
                "degenerate_std_threshold must be a non-negative number".into(),
            ));
        }
        self.optimizer.validate()
    }
}

/// Nelder-Mead settings for the damped trend fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(ForecastError::Config(
                "optimizer.max_iterations must be positive".into(),
            ));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(ForecastError::Config(
                "optimizer.tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_horizon_start() -> i32 {
    2025
}
fn default_horizon_end() -> i32 {
    2040
}
fn default_scenario_adjustment() -> f64 {
    0.2
}
fn default_min_primary_points() -> usize {
    5
}
fn default_min_fallback_points() -> usize {
    3
}
fn default_degenerate_std_threshold() -> f64 {
    0.01
}
fn default_true() -> bool {
    true
}
fn default_max_iterations() -> usize {
    2000
}
fn default_tolerance() -> f64 {
    1e-8
}
fn default_database_path() -> String {
    "instance/price-forecast.db".into()
}
