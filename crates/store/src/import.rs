use std::path::Path;

use common::{ForecastError, Result};
use rusqlite::params;
use serde::Deserialize;
use tracing::info;

use crate::sqlite::{persistence, SqliteStore};

/// One row of a price export, columns named as in `electricity_prices`.
///
/// Non-numeric price components load as NULL.
#[derive(Debug, Deserialize)]
struct PriceRecord {
    period: String,
    canton: String,
    canton_label: String,
    category: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    aidfee: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    charge: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    gridusage: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    energy: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    total: Option<f64>,
}

impl SqliteStore {
    /// Replace the historical price table with the rows of a CSV file.
    ///
    /// The file is parsed completely before anything is deleted; a malformed
    /// file leaves the table untouched.
    pub fn import_csv(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| ForecastError::InvalidInput(format!("{}: {e}", path.display())))?;
        let records = reader
            .deserialize::<PriceRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ForecastError::InvalidInput(format!("{}: {e}", path.display())))?;

        let tx = self.connection_mut().transaction().map_err(persistence)?;
        let deleted = tx
            .execute("DELETE FROM electricity_prices", [])
            .map_err(persistence)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO electricity_prices
                     (period, canton, canton_label, category, aidfee, charge, gridusage, energy, total)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(persistence)?;
            for r in &records {
                stmt.execute(params![
                    r.period.trim(),
                    r.canton,
                    r.canton_label,
                    r.category,
                    r.aidfee,
                    r.charge,
                    r.gridusage,
                    r.energy,
                    r.total,
                ])
                .map_err(persistence)?;
            }
        }
        tx.commit().map_err(persistence)?;

        info!(
            path = %path.display(),
            deleted = deleted,
            imported = records.len(),
            "Imported historical prices"
        );
        Ok(records.len())
    }
}
