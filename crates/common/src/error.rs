use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("degenerate series: sample std dev {std_dev:.6} below threshold {threshold}")]
    DegenerateSeries { std_dev: f64, threshold: f64 },

    #[error("fit failure: {0}")]
    FitFailure(String),

    #[error("fallback needs at least {required} points, got {available}")]
    FallbackInsufficientData { available: usize, required: usize },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ForecastError {
    /// True for failures that only remove one (region, category) pair from a
    /// run. Everything else aborts the run.
    pub fn is_per_pair(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientData(_)
                | ForecastError::DegenerateSeries { .. }
                | ForecastError::FitFailure(_)
                | ForecastError::FallbackInsufficientData { .. }
                | ForecastError::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
