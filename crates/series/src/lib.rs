use std::collections::BTreeSet;

use common::{ForecastConfig, ForecastError, Observation, Result, Series, SeriesKey};
use statrs::statistics::Statistics;
use tracing::debug;

/// Every (region, category) pair to forecast.
///
/// The cartesian product of the distinct region codes and the distinct
/// categories present in `observations`, sorted. A pair that never occurs in
/// the data is still listed; `build_series` rejects it as insufficient.
pub fn group_keys(observations: &[Observation]) -> Vec<SeriesKey> {
    let regions: BTreeSet<&str> = observations
        .iter()
        .map(|o| o.region_code.as_str())
        .collect();
    let categories: BTreeSet<&str> = observations.iter().map(|o| o.category.as_str()).collect();

    regions
        .iter()
        .flat_map(|region| {
            categories
                .iter()
                .map(move |category| SeriesKey::new(*region, *category))
        })
        .collect()
}

/// Build the yearly series for `key`.
///
/// 1. Keep rows whose region code and category match exactly.
/// 2. Drop rows without a usable price.
/// 3. Sort by year and reject duplicate years.
///
/// The region label is taken from the first matching row.
pub fn build_series(observations: &[Observation], key: &SeriesKey) -> Result<Series> {
    let matching: Vec<&Observation> = observations
        .iter()
        .filter(|o| o.region_code == key.region_code && o.category == key.category)
        .collect();

    let region_label = match matching.first() {
        Some(o) => o.region_label.clone(),
        None => {
            return Err(ForecastError::InsufficientData(format!(
                "{key}: no observations"
            )))
        }
    };

    let mut points: Vec<(i32, f64)> = matching
        .iter()
        .filter_map(|o| {
            o.total_price
                .filter(|p| p.is_finite())
                .map(|price| (o.year, price))
        })
        .collect();

    let dropped = matching.len() - points.len();
    if points.is_empty() {
        return Err(ForecastError::InsufficientData(format!(
            "{key}: all {} observations lack a price",
            matching.len()
        )));
    }

    points.sort_by_key(|(year, _)| *year);

    debug!(
        series = %key,
        points = points.len(),
        dropped_missing = dropped,
        first_year = points[0].0,
        last_year = points[points.len() - 1].0,
        "Built series"
    );

    Series::new(key.clone(), region_label, points)
}

/// Check whether `series` may go to the damped trend model.
///
/// Rejects with `InsufficientData` below `min_primary_points` and with
/// `DegenerateSeries` when the sample standard deviation of the prices is
/// below `degenerate_std_threshold`. A rejection here only rules out the
/// primary method.
pub fn primary_gate(series: &Series, config: &ForecastConfig) -> Result<()> {
    if series.len() < config.min_primary_points {
        return Err(ForecastError::InsufficientData(format!(
            "{}: {} points, damped trend needs {}",
            series.key(),
            series.len(),
            config.min_primary_points
        )));
    }

    let std_dev = sample_std_dev(series);
    if std_dev < config.degenerate_std_threshold {
        return Err(ForecastError::DegenerateSeries {
            std_dev,
            threshold: config.degenerate_std_threshold,
        });
    }

    Ok(())
}

/// Sample (n - 1) standard deviation of the prices; 0 for fewer than 2 points.
pub fn sample_std_dev(series: &Series) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    series.prices().std_dev()
}
