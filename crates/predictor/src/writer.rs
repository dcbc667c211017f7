use chrono::{NaiveDateTime, Utc};
use common::{
    CategoryScope, ForecastMethod, PointForecast, PredictionStore, PredictionTransaction, Result,
    ScenarioSet, SeriesKey, StoredPrediction,
};
use serde::Serialize;
use tracing::{info, warn};

/// Everything computed for one (region, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairForecast {
    pub key: SeriesKey,
    pub region_label: String,
    pub method: ForecastMethod,
    pub base: PointForecast,
    pub scenarios: ScenarioSet,
}

/// Flatten `forecasts` into rows, one per (pair, scenario, year).
///
/// Non-finite values are skipped with a warning.
pub fn to_records(forecasts: &[PairForecast], created_at: NaiveDateTime) -> Vec<StoredPrediction> {
    let mut records = Vec::new();
    for pair in forecasts {
        for (scenario, forecast) in pair.scenarios.iter() {
            for (year, value) in forecast.iter() {
                if !value.is_finite() {
                    warn!(
                        series = %pair.key,
                        scenario = %scenario,
                        year = year,
                        value = value,
                        "Skipping non-finite prediction"
                    );
                    continue;
                }
                records.push(StoredPrediction {
                    region_code: pair.key.region_code.clone(),
                    region_label: pair.region_label.clone(),
                    category: pair.key.category.clone(),
                    scenario,
                    year,
                    predicted_total: value,
                    created_at,
                });
            }
        }
    }
    records
}

/// Replace the stored predictions in `scope` with `forecasts`.
///
/// Delete and insert run in one transaction. On any error the transaction
/// is dropped, so the previous predictions stay visible.
pub fn replace_predictions<S: PredictionStore>(
    store: &mut S,
    scope: &CategoryScope,
    forecasts: &[PairForecast],
) -> Result<usize> {
    let records = to_records(forecasts, Utc::now().naive_utc());

    let mut tx = store.begin()?;
    let deleted = tx.clear_scope(scope)?;
    let written = tx.write_batch(&records)?;
    tx.commit()?;

    info!(deleted = deleted, written = written, "Replaced stored predictions");
    Ok(written)
}
