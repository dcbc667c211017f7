use common::{
    CategoryScope, ForecastConfig, ForecastMethod, HistoricalSource, Horizon, Observation,
    PredictionStore, Result, SeriesKey,
};
use serde::Serialize;
use series::{build_series, group_keys};
use tracing::{debug, info, warn};

use crate::engine::ForecastEngine;
use crate::scenario::ScenarioGenerator;
use crate::writer::{replace_predictions, PairForecast};

/// A pair that produced no forecast, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPair {
    pub key: SeriesKey,
    pub reason: String,
}

/// In-memory result of forecasting every pair of a history.
#[derive(Debug, Clone, Default)]
pub struct ForecastBatch {
    pub pairs: Vec<PairForecast>,
    pub skipped: Vec<SkippedPair>,
    pub total_pairs: usize,
}

impl ForecastBatch {
    pub fn count_method(&self, method: ForecastMethod) -> usize {
        self.pairs.iter().filter(|p| p.method == method).count()
    }
}

/// Summary of one `ForecastPipeline::run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub horizon: Horizon,
    pub pairs_total: usize,
    pub damped_trend: usize,
    pub linear_trend: usize,
    pub skipped: Vec<SkippedPair>,
    pub rows_written: usize,
}

/// Batch driver: load, build series, forecast, expand scenarios, replace.
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    horizon: Horizon,
    engine: ForecastEngine,
    scenarios: ScenarioGenerator,
}

impl ForecastPipeline {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            horizon: config.horizon()?,
            engine: ForecastEngine::new(&config),
            scenarios: ScenarioGenerator::new(config.scenario_adjustment)?,
        })
    }

    /// Override the configured horizon.
    pub fn with_horizon(mut self, horizon: Horizon) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// Forecast one pair. Every error is specific to that pair.
    pub fn forecast_pair(&self, observations: &[Observation], key: &SeriesKey) -> Result<PairForecast> {
        let series = build_series(observations, key)?;
        let result = self.engine.forecast(&series, &self.horizon)?;
        let scenarios = self.scenarios.generate(&result.forecast);

        debug!(
            series = %key,
            method = %result.method,
            points = series.len(),
            "Pair forecast"
        );

        Ok(PairForecast {
            key: key.clone(),
            region_label: series.region_label().to_string(),
            method: result.method,
            base: result.forecast,
            scenarios,
        })
    }

    /// Forecast every (region, category) pair present in `observations`.
    ///
    /// Pairs that cannot be forecast are collected in `skipped`; they never
    /// fail the batch.
    pub fn forecast_all(&self, observations: &[Observation]) -> ForecastBatch {
        let keys = group_keys(observations);
        let mut batch = ForecastBatch {
            total_pairs: keys.len(),
            ..ForecastBatch::default()
        };

        for key in keys {
            match self.forecast_pair(observations, &key) {
                Ok(pair) => batch.pairs.push(pair),
                Err(e) => {
                    warn!(series = %key, reason = %e, "Skipping pair");
                    batch.skipped.push(SkippedPair {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }
        batch
    }

    /// Load the history in `scope`, forecast it and replace the stored
    /// predictions of that scope.
    ///
    /// Only storage errors abort the run.
    pub fn run<H, S>(&self, source: &H, store: &mut S, scope: &CategoryScope) -> Result<RunReport>
    where
        H: HistoricalSource + ?Sized,
        S: PredictionStore,
    {
        let observations = source.load_observations(scope)?;
        info!(
            observations = observations.len(),
            horizon_start = self.horizon.start(),
            horizon_end = self.horizon.end(),
            "Starting forecast run"
        );

        let batch = self.forecast_all(&observations);
        let rows_written = replace_predictions(store, scope, &batch.pairs)?;

        let report = RunReport {
            horizon: self.horizon,
            pairs_total: batch.total_pairs,
            damped_trend: batch.count_method(ForecastMethod::DampedTrend),
            linear_trend: batch.count_method(ForecastMethod::LinearTrend),
            skipped: batch.skipped,
            rows_written,
        };

        info!(
            pairs = report.pairs_total,
            damped_trend = report.damped_trend,
            linear_trend = report.linear_trend,
            skipped = report.skipped.len(),
            rows = report.rows_written,
            "Forecast run complete"
        );
        Ok(report)
    }
}
