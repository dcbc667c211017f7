//! SQLite store: loader coercion, transactional replace, queries, CSV import.

use std::io::Write;

use chrono::NaiveDate;
use common::{
    CategoryScope, ForecastError, HistoricalSource, Observation, PredictionStore,
    PredictionTransaction, Scenario, StoredPrediction,
};
use rusqlite::params;
use store::{PredictionFilter, SqliteStore};

fn store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

fn obs(region: &str, category: &str, year: i32, price: Option<f64>) -> Observation {
    Observation {
        region_code: region.into(),
        region_label: "Zürich".into(),
        category: category.into(),
        year,
        total_price: price,
    }
}

fn prediction(category: &str, scenario: Scenario, year: i32, value: f64) -> StoredPrediction {
    StoredPrediction {
        region_code: "1".into(),
        region_label: "Zürich".into(),
        category: category.into(),
        scenario,
        year,
        predicted_total: value,
        created_at: NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    }
}

fn write(store: &mut SqliteStore, scope: &CategoryScope, records: &[StoredPrediction]) {
    let mut tx = store.begin().unwrap();
    tx.clear_scope(scope).unwrap();
    tx.write_batch(records).unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_load_round_trips_observations() {
    let mut store = store();
    let rows = vec![
        obs("1", "C2", 2020, Some(20.5)),
        obs("1", "C2", 2021, None),
        obs("1", "C3", 2020, Some(18.0)),
    ];
    store.insert_observations(&rows).unwrap();

    let loaded = store.load_observations(&CategoryScope::All).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.contains(&obs("1", "C2", 2021, None)));
    assert!(loaded.contains(&obs("1", "C2", 2020, Some(20.5))));
}

#[test]
fn test_load_coerces_raw_columns() {
    let store = store();
    let conn = store.connection();
    let insert = "INSERT INTO electricity_prices (period, canton, canton_label, category, total)
                  VALUES (?1, '1', 'Zürich', 'C2', ?2)";
    conn.execute(insert, params!["2019", "21.25"]).unwrap();
    conn.execute(insert, params!["2020", "n/a"]).unwrap();
    conn.execute(insert, params!["20x1", 22.0]).unwrap();
    conn.execute(insert, params![2022, 23]).unwrap();

    let loaded = store.load_observations(&CategoryScope::All).unwrap();
    let pairs: Vec<_> = loaded.iter().map(|o| (o.year, o.total_price)).collect();
    assert_eq!(
        pairs,
        vec![(2019, Some(21.25)), (2020, None), (2022, Some(23.0))]
    );
}

#[test]
fn test_load_respects_scope() {
    let mut store = store();
    store
        .insert_observations(&[
            obs("1", "C2", 2020, Some(20.0)),
            obs("1", "C3", 2020, Some(18.0)),
        ])
        .unwrap();

    let loaded = store
        .load_observations(&CategoryScope::Only(vec!["C3".into()]))
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].category, "C3");
}

#[test]
fn test_replace_and_query_predictions() {
    let mut store = store();
    write(
        &mut store,
        &CategoryScope::All,
        &[
            prediction("C2", Scenario::Medium, 2025, 21.0),
            prediction("C2", Scenario::Optimistic, 2025, 25.2),
            prediction("C2", Scenario::Medium, 2026, 21.5),
        ],
    );

    let all = store.query_predictions(&PredictionFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], prediction("C2", Scenario::Medium, 2025, 21.0));

    let filtered = store
        .query_predictions(&PredictionFilter {
            year: Some(2025),
            scenario: Some(Scenario::Optimistic),
            ..PredictionFilter::default()
        })
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].predicted_total, 25.2);

    let none = store
        .query_predictions(&PredictionFilter {
            region: Some("26".into()),
            ..PredictionFilter::default()
        })
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_clear_scope_only_listed_categories() {
    let mut store = store();
    write(
        &mut store,
        &CategoryScope::All,
        &[
            prediction("C2", Scenario::Medium, 2025, 21.0),
            prediction("C3", Scenario::Medium, 2025, 19.0),
        ],
    );

    write(
        &mut store,
        &CategoryScope::Only(vec!["C2".into()]),
        &[prediction("C2", Scenario::Medium, 2025, 22.0)],
    );

    let rows = store.query_predictions(&PredictionFilter::default()).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.contains(&prediction("C2", Scenario::Medium, 2025, 22.0)));
    assert!(rows.contains(&prediction("C3", Scenario::Medium, 2025, 19.0)));
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let mut store = store();
    write(
        &mut store,
        &CategoryScope::All,
        &[prediction("C2", Scenario::Medium, 2025, 21.0)],
    );

    {
        let mut tx = store.begin().unwrap();
        assert_eq!(tx.clear_scope(&CategoryScope::All).unwrap(), 1);
        tx.write_batch(&[prediction("C2", Scenario::Medium, 2025, 99.0)])
            .unwrap();
        // dropped without commit
    }

    let rows = store.query_predictions(&PredictionFilter::default()).unwrap();
    assert_eq!(rows, vec![prediction("C2", Scenario::Medium, 2025, 21.0)]);
}

#[test]
fn test_write_fails_without_schema() {
    let mut store = SqliteStore::in_memory().unwrap();
    let mut tx = store.begin().unwrap();
    let result = tx.write_batch(&[prediction("C2", Scenario::Medium, 2025, 21.0)]);
    assert!(matches!(result, Err(ForecastError::Persistence(_))));
}

#[test]
fn test_on_disk_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prices.db");
    {
        let mut store = SqliteStore::open(&path).unwrap();
        store.migrate().unwrap();
        store
            .insert_observations(&[obs("1", "C2", 2020, Some(20.0))])
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let loaded = store.load_observations(&CategoryScope::All).unwrap();
    assert_eq!(loaded, vec![obs("1", "C2", 2020, Some(20.0))]);
}

#[test]
fn test_import_csv_replaces_history() {
    let mut store = store();
    store
        .insert_observations(&[obs("9", "C9", 2000, Some(1.0))])
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "period,canton,canton_label,category,aidfee,charge,gridusage,energy,total"
    )
    .unwrap();
    writeln!(file, "2023,1,Zürich,C2,0.6,1.2,9.1,12.3,23.2").unwrap();
    writeln!(file, "2024,1,Zürich,C2,0.6,1.3,9.4,13.0,").unwrap();
    writeln!(file, "2024,2,Bern,C2,0.6,1.1,8.0,12.0,n/a").unwrap();
    file.flush().unwrap();

    let imported = store.import_csv(file.path()).unwrap();
    assert_eq!(imported, 3);

    let loaded = store.load_observations(&CategoryScope::All).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.iter().all(|o| o.region_code != "9"));
    let zurich_2023 = loaded
        .iter()
        .find(|o| o.region_code == "1" && o.year == 2023)
        .unwrap();
    assert_eq!(zurich_2023.total_price, Some(23.2));
    assert!(loaded
        .iter()
        .filter(|o| o.year == 2024)
        .all(|o| o.total_price.is_none()));
}

#[test]
fn test_import_missing_file_is_invalid_input() {
    let mut store = store();
    let result = store.import_csv("/nonexistent/prices.csv");
    assert!(matches!(result, Err(ForecastError::InvalidInput(_))));
}
