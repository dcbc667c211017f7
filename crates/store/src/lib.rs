//! SQLite persistence for historical prices and stored predictions.

mod import;
mod sqlite;

pub use sqlite::{PredictionFilter, SqliteStore, SqliteTransaction};
