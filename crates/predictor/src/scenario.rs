use common::{ForecastError, PointForecast, Result, ScenarioSet};

/// Expands a base forecast into conservative / medium / optimistic bands.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioGenerator {
    adjustment: f64,
}

impl ScenarioGenerator {
    /// `adjustment` is the symmetric fraction, e.g. 0.2 for ±20%.
    pub fn new(adjustment: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&adjustment) {
            return Err(ForecastError::Config(format!(
                "scenario adjustment must be in [0, 1), got {adjustment}"
            )));
        }
        Ok(Self { adjustment })
    }

    pub fn adjustment(&self) -> f64 {
        self.adjustment
    }

    pub fn generate(&self, base: &PointForecast) -> ScenarioSet {
        let down = 1.0 - self.adjustment;
        let up = 1.0 + self.adjustment;
        ScenarioSet {
            conservative: base.map(|v| v * down),
            medium: base.clone(),
            optimistic: base.map(|v| v * up),
        }
    }
}
