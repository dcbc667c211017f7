//! End-to-end runs against an on-disk SQLite database.

use approx::assert_abs_diff_eq;
use common::{CategoryScope, ForecastConfig, Horizon, Observation, Scenario};
use predictor::ForecastPipeline;
use store::{PredictionFilter, SqliteStore};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

fn obs(region: &str, label: &str, category: &str, year: i32, price: f64) -> Observation {
    Observation {
        region_code: region.into(),
        region_label: label.into(),
        category: category.into(),
        year,
        total_price: Some(price),
    }
}

/// Two cantons, two categories, 2011-2024 like the upstream export.
///
/// Returns separate read and write connections to the same database file.
fn seeded_store() -> (TempDir, SqliteStore, SqliteStore) {
    let zurich_c2 = [
        20.1, 20.6, 20.9, 20.7, 20.3, 20.0, 19.8, 20.4, 20.6, 20.9, 21.1, 21.4, 27.2, 32.1,
    ];
    let zurich_c3 = [
        17.2, 17.5, 17.9, 17.6, 17.1, 16.8, 16.5, 17.0, 17.3, 17.6, 17.9, 18.3, 24.9, 29.4,
    ];
    let bern_c2 = [22.0, 22.4, 23.1];

    let mut rows = Vec::new();
    for (i, price) in zurich_c2.iter().enumerate() {
        rows.push(obs("1", "Zürich", "C2", 2011 + i as i32, *price));
    }
    for (i, price) in zurich_c3.iter().enumerate() {
        rows.push(obs("1", "Zürich", "C3", 2011 + i as i32, *price));
    }
    for (i, price) in bern_c2.iter().enumerate() {
        rows.push(obs("2", "Bern", "C2", 2022 + i as i32, *price));
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prices.db");
    let mut reader = SqliteStore::open(&path).unwrap();
    reader.migrate().unwrap();
    reader.insert_observations(&rows).unwrap();
    let writer = SqliteStore::open(&path).unwrap();
    (dir, reader, writer)
}

#[test]
fn test_full_run_persists_scenarios() {
    init_tracing();
    let (_dir, reader, mut store) = seeded_store();
    let pipeline = ForecastPipeline::new(ForecastConfig::default()).unwrap();

    let report = pipeline
        .run(&reader, &mut store, &CategoryScope::All)
        .unwrap();

    // Bern has no C3 history at all.
    assert_eq!(report.pairs_total, 4);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.damped_trend + report.linear_trend, 3);
    assert_eq!(report.rows_written, 3 * 3 * 16);

    let rows = store
        .query_predictions(&PredictionFilter::default())
        .unwrap();
    assert_eq!(rows.len(), report.rows_written);
    assert!(rows.iter().all(|r| (2025..=2040).contains(&r.year)));
    assert!(rows.iter().all(|r| r.predicted_total >= 0.0));
}

#[test]
fn test_sample_lookup_after_run() {
    init_tracing();
    let (_dir, reader, mut store) = seeded_store();
    let pipeline = ForecastPipeline::new(ForecastConfig::default()).unwrap();
    pipeline
        .run(&reader, &mut store, &CategoryScope::All)
        .unwrap();

    let sample = store
        .query_predictions(&PredictionFilter {
            region: Some("1".into()),
            year: Some(2025),
            category: Some("C2".into()),
            scenario: None,
        })
        .unwrap();
    assert_eq!(sample.len(), 3);

    let value = |s: Scenario| {
        sample
            .iter()
            .find(|r| r.scenario == s)
            .map(|r| r.predicted_total)
            .unwrap()
    };
    let medium = value(Scenario::Medium);
    assert_abs_diff_eq!(value(Scenario::Conservative), medium * 0.8, epsilon = 1e-9);
    assert_abs_diff_eq!(value(Scenario::Optimistic), medium * 1.2, epsilon = 1e-9);
    assert_eq!(sample[0].region_label, "Zürich");
}

#[test]
fn test_rerun_replaces_rows() {
    init_tracing();
    let (_dir, reader, mut store) = seeded_store();
    let pipeline = ForecastPipeline::new(ForecastConfig::default())
        .unwrap()
        .with_horizon(Horizon::new(2025, 2030).unwrap());

    let first = pipeline
        .run(&reader, &mut store, &CategoryScope::All)
        .unwrap();
    let before = store
        .query_predictions(&PredictionFilter::default())
        .unwrap();
    let second = pipeline
        .run(&reader, &mut store, &CategoryScope::All)
        .unwrap();
    let after = store
        .query_predictions(&PredictionFilter::default())
        .unwrap();

    assert_eq!(first.rows_written, second.rows_written);
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(
            (&a.region_code, &a.category, a.scenario, a.year),
            (&b.region_code, &b.category, b.scenario, b.year)
        );
        assert_abs_diff_eq!(a.predicted_total, b.predicted_total, epsilon = 1e-9);
    }
}
