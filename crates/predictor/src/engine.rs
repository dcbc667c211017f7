use common::{
    ForecastConfig, ForecastError, ForecastMethod, ForecastModel, Horizon, PointForecast, Result,
    Series,
};
use models::{DampedTrendModel, LinearTrendModel};
use series::primary_gate;
use tracing::{debug, warn};

/// Outcome of the primary (damped trend) stage.
#[derive(Debug)]
pub enum PrimaryOutcome {
    /// Finite forecast for every horizon year.
    Success(PointForecast),
    /// The series did not pass the primary gate; the model was not run.
    Rejected(ForecastError),
    /// The model ran and failed or produced non-finite values.
    Failure(ForecastError),
    /// Primary method switched off in the configuration.
    Disabled,
}

/// Base forecast plus the method that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineForecast {
    pub forecast: PointForecast,
    pub method: ForecastMethod,
}

/// Damped trend first, linear trend when that is not possible.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    config: ForecastConfig,
    primary: DampedTrendModel,
    fallback: LinearTrendModel,
}

impl ForecastEngine {
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            config: config.clone(),
            primary: DampedTrendModel::new(&config.optimizer),
            fallback: LinearTrendModel::new(config.min_fallback_points),
        }
    }

    /// Forecast every year of `horizon` for `series`.
    ///
    /// Errors are per-series: `InvalidInput` when the horizon does not start
    /// after the history, `FallbackInsufficientData` when neither method can
    /// run.
    pub fn forecast(&self, series: &Series, horizon: &Horizon) -> Result<EngineForecast> {
        let last_year = series.last_year().ok_or_else(|| {
            ForecastError::InsufficientData(format!("{}: empty series", series.key()))
        })?;
        horizon.steps_after(last_year)?;

        match self.run_primary(series, horizon) {
            PrimaryOutcome::Success(forecast) => {
                let forecast = if self.config.clamp_primary {
                    clamp_non_negative(&forecast)
                } else {
                    forecast
                };
                return Ok(EngineForecast {
                    forecast,
                    method: self.primary.method(),
                });
            }
            PrimaryOutcome::Rejected(reason) => {
                debug!(series = %series.key(), reason = %reason, "Primary method skipped");
            }
            PrimaryOutcome::Failure(reason) => {
                warn!(
                    series = %series.key(),
                    reason = %reason,
                    "Damped trend failed, falling back to linear trend"
                );
            }
            PrimaryOutcome::Disabled => {
                debug!(series = %series.key(), "Primary method disabled");
            }
        }

        let forecast = self.fallback.fit_forecast(series, horizon)?;
        Ok(EngineForecast {
            forecast,
            method: self.fallback.method(),
        })
    }

    /// Run only the primary stage.
    pub fn run_primary(&self, series: &Series, horizon: &Horizon) -> PrimaryOutcome {
        if !self.config.primary_enabled {
            return PrimaryOutcome::Disabled;
        }
        if let Err(reason) = primary_gate(series, &self.config) {
            return PrimaryOutcome::Rejected(reason);
        }

        match self.primary.fit_forecast(series, horizon) {
            Ok(forecast) if forecast.values().iter().all(|v| v.is_finite()) => {
                PrimaryOutcome::Success(forecast)
            }
            Ok(_) => PrimaryOutcome::Failure(ForecastError::FitFailure(format!(
                "{}: non-finite forecast values",
                series.key()
            ))),
            Err(e) => PrimaryOutcome::Failure(e),
        }
    }
}

pub fn clamp_non_negative(forecast: &PointForecast) -> PointForecast {
    forecast.map(|v| v.max(0.0))
}
