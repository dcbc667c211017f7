//! # pricecast
//!
//! Command-line entry point for the yearly electricity price forecast.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{AppConfig, CategoryScope, Horizon, Scenario};
use predictor::{ForecastPipeline, RunReport};
use store::{PredictionFilter, SqliteStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "config/app_config.yaml";

#[derive(Parser)]
#[command(name = "pricecast")]
#[command(about = "Scenario forecasts of yearly electricity prices", long_about = None)]
struct Cli {
    /// Configuration file (defaults apply when missing)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides `storage.database_path`
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and indexes
    Migrate,

    /// Replace the historical prices with the rows of a CSV export
    Import {
        /// CSV with the columns of `electricity_prices`
        csv: PathBuf,
    },

    /// Forecast every region/category pair and store the scenarios
    Forecast {
        /// Restrict the run to these categories (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// First forecast year
        #[arg(long)]
        start: Option<i32>,

        /// Last forecast year
        #[arg(long)]
        end: Option<i32>,

        /// Skip the damped trend and use the linear trend only
        #[arg(long)]
        fallback_only: bool,
    },

    /// List stored predictions
    Predictions {
        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        category: Option<String>,

        /// conservative, medium or optimistic
        #[arg(long)]
        scenario: Option<Scenario>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.database_path));

    match cli.command {
        Commands::Migrate => {
            open_store(&database)?;
            info!(path = %database.display(), "Schema ready");
        }
        Commands::Import { csv } => {
            let mut store = open_store(&database)?;
            let count = store
                .import_csv(&csv)
                .with_context(|| format!("importing {}", csv.display()))?;
            println!("{count} price records imported from {}", csv.display());
        }
        Commands::Forecast {
            categories,
            start,
            end,
            fallback_only,
        } => {
            let mut forecast = config.forecast.clone();
            if let Some(start) = start {
                forecast.horizon_start = start;
            }
            if let Some(end) = end {
                forecast.horizon_end = end;
            }
            if fallback_only {
                forecast.primary_enabled = false;
            }
            let pipeline = ForecastPipeline::new(forecast).context("invalid forecast settings")?;

            let scope = if categories.is_empty() {
                CategoryScope::All
            } else {
                CategoryScope::Only(categories)
            };

            // Separate connections: one reads the history, one owns the write transaction.
            let reader = open_store(&database)?;
            let mut writer = SqliteStore::open(&database)?;
            let report = pipeline
                .run(&reader, &mut writer, &scope)
                .context("forecast run failed")?;

            print_report(&report);
            print_sample(&writer, report.horizon)?;
        }
        Commands::Predictions {
            region,
            year,
            category,
            scenario,
            json,
        } => {
            let store = open_store(&database)?;
            let rows = store.query_predictions(&PredictionFilter {
                region,
                year,
                category,
                scenario,
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for r in &rows {
                    println!(
                        "{:>4} {:<3} {:<20} {:<4} {:<12} {:>8.2}",
                        r.year, r.region_code, r.region_label, r.category, r.scenario, r.predicted_total
                    );
                }
                println!("{} predictions", rows.len());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => AppConfig::from_yaml_file(DEFAULT_CONFIG)
            .with_context(|| format!("loading {DEFAULT_CONFIG}"))?,
        None => {
            warn!("No configuration file found, using defaults");
            AppConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = SqliteStore::open(path).with_context(|| format!("opening {}", path.display()))?;
    store.migrate()?;
    Ok(store)
}

fn print_report(report: &RunReport) {
    println!(
        "Horizon {}-{}: {} pairs, {} damped trend, {} linear trend, {} skipped",
        report.horizon.start(),
        report.horizon.end(),
        report.pairs_total,
        report.damped_trend,
        report.linear_trend,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.key, skipped.reason);
    }
    println!("{} predictions saved", report.rows_written);
}

/// Scenario values of the first stored pair at the horizon start.
fn print_sample(store: &SqliteStore, horizon: Horizon) -> Result<()> {
    let rows = store.query_predictions(&PredictionFilter {
        year: Some(horizon.start()),
        ..PredictionFilter::default()
    })?;
    let Some(first) = rows.first() else {
        return Ok(());
    };

    println!(
        "\nSample forecasts for {} {} in {}:",
        first.region_label,
        first.category,
        horizon.start()
    );
    for r in rows
        .iter()
        .filter(|r| r.region_code == first.region_code && r.category == first.category)
    {
        println!("  {}: {:.2} Rp/kWh", r.scenario, r.predicted_total);
    }
    Ok(())
}
