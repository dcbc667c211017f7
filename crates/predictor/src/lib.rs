//! Yearly price forecasting: two-stage engine, scenario bands and the batch
//! pipeline that writes them to a prediction store.

mod engine;
mod pipeline;
mod scenario;
mod writer;

pub use engine::{clamp_non_negative, EngineForecast, ForecastEngine, PrimaryOutcome};
pub use pipeline::{ForecastBatch, ForecastPipeline, RunReport, SkippedPair};
pub use scenario::ScenarioGenerator;
pub use writer::{replace_predictions, to_records, PairForecast};
