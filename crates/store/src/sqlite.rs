use std::path::Path;

use chrono::NaiveDateTime;
use common::{
    CategoryScope, ForecastError, HistoricalSource, Observation, PredictionStore,
    PredictionTransaction, Result, Scenario, StoredPrediction,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use tracing::{debug, warn};

pub(crate) fn persistence(e: impl std::fmt::Display) -> ForecastError {
    ForecastError::Persistence(e.to_string())
}

/// SQLite-backed historical source and prediction store.
pub struct SqliteStore {
    conn: Connection,
}

/// Optional filters for [`SqliteStore::query_predictions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionFilter {
    pub region: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub scenario: Option<Scenario>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(persistence)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(persistence)?;
        debug!(path = %path.as_ref().display(), "Opened database");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(persistence)?;
        Ok(Self { conn })
    }

    /// Create tables and indexes if missing.
    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(include_str!("../migrations/001_schema.sql"))
            .map_err(persistence)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Append observations to the historical table.
    pub fn insert_observations(&mut self, observations: &[Observation]) -> Result<usize> {
        let tx = self.conn.transaction().map_err(persistence)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO electricity_prices (period, canton, canton_label, category, total)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(persistence)?;
            for o in observations {
                stmt.execute(params![
                    o.year.to_string(),
                    o.region_code,
                    o.region_label,
                    o.category,
                    o.total_price,
                ])
                .map_err(persistence)?;
            }
        }
        tx.commit().map_err(persistence)?;
        Ok(observations.len())
    }

    /// Stored predictions matching `filter`, ordered by region, category,
    /// scenario and year.
    pub fn query_predictions(&self, filter: &PredictionFilter) -> Result<Vec<StoredPrediction>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(region) = &filter.region {
            clauses.push("canton = ?");
            values.push(Value::Text(region.clone()));
        }
        if let Some(year) = filter.year {
            clauses.push("period = ?");
            values.push(Value::Text(year.to_string()));
        }
        if let Some(category) = &filter.category {
            clauses.push("category = ?");
            values.push(Value::Text(category.clone()));
        }
        if let Some(scenario) = filter.scenario {
            clauses.push("scenario = ?");
            values.push(Value::Text(scenario.as_str().to_string()));
        }

        let mut sql = String::from(
            "SELECT period, canton, canton_label, category, scenario, predicted_total, created_at
             FROM electricity_price_predictions",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY canton, category, scenario, period");

        let mut stmt = self.conn.prepare(&sql).map_err(persistence)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, NaiveDateTime>(6)?,
                ))
            })
            .map_err(persistence)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(persistence)?;

        rows.into_iter()
            .map(
                |(period, region_code, region_label, category, scenario, predicted_total, created_at)|
                 -> Result<StoredPrediction> {
                    let year = period.trim().parse::<i32>().map_err(|_| {
                        persistence(format!("invalid prediction period '{period}'"))
                    })?;
                    Ok(StoredPrediction {
                        region_code,
                        region_label,
                        category,
                        scenario: scenario.parse::<Scenario>()?,
                        year,
                        predicted_total,
                        created_at,
                    })
                },
            )
            .collect()
    }
}

/// Year column as stored; SQLite may hold it as text, integer or real.
fn coerce_year(value: &Value) -> Option<i32> {
    match value {
        Value::Integer(i) => i32::try_from(*i).ok(),
        Value::Real(f) if f.fract() == 0.0 => Some(*f as i32),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Price column; anything not numeric becomes `None`.
fn coerce_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Real(f) => *f,
        Value::Integer(i) => *i as f64,
        Value::Text(s) => s.trim().parse().ok()?,
        Value::Null | Value::Blob(_) => return None,
    };
    price.is_finite().then_some(price)
}

impl HistoricalSource for SqliteStore {
    fn load_observations(&self, scope: &CategoryScope) -> Result<Vec<Observation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT period, canton, canton_label, category, total
                 FROM electricity_prices
                 ORDER BY canton, category, period",
            )
            .map_err(persistence)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Value>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Value>(4)?,
                ))
            })
            .map_err(persistence)?;

        let mut observations = Vec::new();
        for row in rows {
            let (period, region_code, region_label, category, total) = row.map_err(persistence)?;
            if !scope.includes(&category) {
                continue;
            }
            let Some(year) = coerce_year(&period) else {
                warn!(
                    region = %region_code,
                    category = %category,
                    period = ?period,
                    "Skipping row with unparsable period"
                );
                continue;
            };
            observations.push(Observation {
                region_code,
                region_label,
                category,
                year,
                total_price: coerce_price(&total),
            });
        }

        debug!(rows = observations.len(), "Loaded historical observations");
        Ok(observations)
    }
}

/// Open write transaction on the prediction table.
pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl PredictionStore for SqliteStore {
    type Tx<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        let tx = self.conn.transaction().map_err(persistence)?;
        Ok(SqliteTransaction { tx })
    }
}

impl PredictionTransaction for SqliteTransaction<'_> {
    fn clear_scope(&mut self, scope: &CategoryScope) -> Result<usize> {
        match scope {
            CategoryScope::All => self
                .tx
                .execute("DELETE FROM electricity_price_predictions", [])
                .map_err(persistence),
            CategoryScope::Only(categories) if categories.is_empty() => Ok(0),
            CategoryScope::Only(categories) => {
                let placeholders = vec!["?"; categories.len()].join(", ");
                self.tx
                    .execute(
                        &format!(
                            "DELETE FROM electricity_price_predictions WHERE category IN ({placeholders})"
                        ),
                        params_from_iter(categories.iter()),
                    )
                    .map_err(persistence)
            }
        }
    }

    fn write_batch(&mut self, records: &[StoredPrediction]) -> Result<usize> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "INSERT INTO electricity_price_predictions
                 (period, canton, canton_label, category, scenario, predicted_total, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(persistence)?;
        for r in records {
            stmt.execute(params![
                r.year.to_string(),
                r.region_code,
                r.region_label,
                r.category,
                r.scenario.as_str(),
                r.predicted_total,
                r.created_at,
            ])
            .map_err(persistence)?;
        }
        Ok(records.len())
    }

    fn commit(self) -> Result<()> {
        self.tx.commit().map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_year() {
        assert_eq!(coerce_year(&Value::Text("2021".into())), Some(2021));
        assert_eq!(coerce_year(&Value::Text(" 2021 ".into())), Some(2021));
        assert_eq!(coerce_year(&Value::Integer(2019)), Some(2019));
        assert_eq!(coerce_year(&Value::Real(2020.0)), Some(2020));
        assert_eq!(coerce_year(&Value::Real(2020.5)), None);
        assert_eq!(coerce_year(&Value::Text("20x1".into())), None);
        assert_eq!(coerce_year(&Value::Null), None);
    }

    #[test]
    fn test_coerce_price() {
        assert_eq!(coerce_price(&Value::Real(21.5)), Some(21.5));
        assert_eq!(coerce_price(&Value::Integer(20)), Some(20.0));
        assert_eq!(coerce_price(&Value::Text("19.75".into())), Some(19.75));
        assert_eq!(coerce_price(&Value::Text("n/a".into())), None);
        assert_eq!(coerce_price(&Value::Text("NaN".into())), None);
        assert_eq!(coerce_price(&Value::Null), None);
    }

    #[test]
    fn test_migrate_is_repeatable() {
        let store = SqliteStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.migrate().unwrap();
    }
}
