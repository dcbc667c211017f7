use common::{ForecastError, ForecastMethod, ForecastModel, Horizon, PointForecast, Result, Series};
use tracing::debug;

/// Ordinary least squares line of price on year.
///
/// Extrapolated values are clamped at zero since prices cannot go negative.
#[derive(Debug, Clone)]
pub struct LinearTrendModel {
    min_points: usize,
}

/// Fitted line, centred on the mean year for numerical stability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    /// Fitted price at `mean_year`.
    pub intercept: f64,
    pub mean_year: f64,
}

impl LinearFit {
    pub fn predict(&self, year: i32) -> f64 {
        self.intercept + self.slope * (year as f64 - self.mean_year)
    }
}

impl LinearTrendModel {
    pub fn new(min_points: usize) -> Self {
        Self { min_points }
    }

    pub fn fit(&self, points: &[(i32, f64)]) -> Result<LinearFit> {
        if points.len() < self.min_points.max(2) {
            return Err(ForecastError::FallbackInsufficientData {
                available: points.len(),
                required: self.min_points.max(2),
            });
        }

        let (slope, intercept, mean_year) = centred_linreg(points);
        Ok(LinearFit {
            slope,
            intercept,
            mean_year,
        })
    }
}

impl ForecastModel for LinearTrendModel {
    fn name(&self) -> &str {
        "LinearTrend"
    }

    fn method(&self) -> ForecastMethod {
        ForecastMethod::LinearTrend
    }

    fn fit_forecast(&self, series: &Series, horizon: &Horizon) -> Result<PointForecast> {
        let fit = self.fit(series.points())?;
        if let Some(last_year) = series.last_year() {
            horizon.steps_after(last_year)?;
        }

        debug!(
            series = %series.key(),
            slope = fit.slope,
            intercept = fit.intercept,
            "Linear trend fitted"
        );

        let values = horizon.years().map(|y| fit.predict(y).max(0.0)).collect();
        Ok(PointForecast::new(horizon.start(), values))
    }
}

fn centred_linreg(points: &[(i32, f64)]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| *x as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| *y).sum::<f64>() / n;

    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = *x as f64 - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });

    if sxx.abs() < 1e-15 {
        return (0.0, mean_y, mean_x);
    }
    (sxy / sxx, mean_y, mean_x)
}
