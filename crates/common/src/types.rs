use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{ForecastError, Result};

/// Earliest year accepted in a series or horizon.
pub const MIN_YEAR: i32 = 1;
/// Latest year accepted in a series or horizon.
pub const MAX_YEAR: i32 = 9999;

fn check_year(year: i32, what: &str) -> Result<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(ForecastError::InvalidInput(format!(
            "{what} {year} outside {MIN_YEAR}..={MAX_YEAR}"
        )))
    }
}

/// One historical price reading as delivered by the loader.
///
/// `total_price` is `None` when the upstream value was missing or not numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub region_code: String,
    pub region_label: String,
    pub category: String,
    pub year: i32,
    pub total_price: Option<f64>,
}

/// Identity of one forecasting unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub region_code: String,
    pub category: String,
}

impl SeriesKey {
    pub fn new(region_code: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            region_code: region_code.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region_code, self.category)
    }
}

/// Yearly price history of one (region, category) pair.
///
/// Years are strictly increasing. Gaps are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    key: SeriesKey,
    region_label: String,
    points: Vec<(i32, f64)>,
}

impl Series {
    /// Build a series from points already sorted by year.
    ///
    /// Returns `InvalidInput` on duplicate or unordered years, on years
    /// outside `MIN_YEAR..=MAX_YEAR` and on non-finite prices.
    pub fn new(
        key: SeriesKey,
        region_label: impl Into<String>,
        points: Vec<(i32, f64)>,
    ) -> Result<Self> {
        for w in points.windows(2) {
            if w[1].0 <= w[0].0 {
                return Err(ForecastError::InvalidInput(format!(
                    "{key}: years must be strictly increasing, found {} after {}",
                    w[1].0, w[0].0
                )));
            }
        }
        for &(year, _) in points.first().into_iter().chain(points.last()) {
            check_year(year, &format!("{key}: year"))?;
        }
        if let Some((year, price)) = points.iter().find(|(_, p)| !p.is_finite()) {
            return Err(ForecastError::InvalidInput(format!(
                "{key}: non-finite price {price} in {year}"
            )));
        }
        Ok(Self {
            key,
            region_label: region_label.into(),
            points,
        })
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn region_code(&self) -> &str {
        &self.key.region_code
    }

    pub fn category(&self) -> &str {
        &self.key.category
    }

    pub fn region_label(&self) -> &str {
        &self.region_label
    }

    pub fn points(&self) -> &[(i32, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.points.iter().map(|(y, _)| *y)
    }

    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, p)| *p)
    }

    pub fn first_year(&self) -> Option<i32> {
        self.points.first().map(|(y, _)| *y)
    }

    pub fn last_year(&self) -> Option<i32> {
        self.points.last().map(|(y, _)| *y)
    }
}

/// Closed range of forecast years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon {
    start: i32,
    end: i32,
}

impl Horizon {
    /// Both ends must lie in `MIN_YEAR..=MAX_YEAR`.
    pub fn new(start: i32, end: i32) -> Result<Self> {
        check_year(start, "horizon start")?;
        check_year(end, "horizon end")?;
        if end < start {
            return Err(ForecastError::InvalidInput(format!(
                "horizon end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    /// Number of years in the horizon (always at least 1).
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    /// Number of annual steps from `last_year` to the horizon end.
    ///
    /// The horizon must start after `last_year`; forecasts never overlap
    /// the history they were fitted on.
    pub fn steps_after(&self, last_year: i32) -> Result<usize> {
        if self.start <= last_year {
            return Err(ForecastError::InvalidInput(format!(
                "horizon {}-{} does not start after last observed year {last_year}",
                self.start, self.end
            )));
        }
        Ok((i64::from(self.end) - i64::from(last_year)) as usize)
    }
}

/// Forecast values for a contiguous run of years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointForecast {
    start_year: i32,
    values: Vec<f64>,
}

impl PointForecast {
    pub fn new(start_year: i32, values: Vec<f64>) -> Self {
        Self { start_year, values }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// Last covered year, `None` when empty.
    pub fn end_year(&self) -> Option<i32> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.start_year + self.values.len() as i32 - 1)
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, year: i32) -> Option<f64> {
        let offset = year.checked_sub(self.start_year)?;
        if offset < 0 {
            return None;
        }
        self.values.get(offset as usize).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.start_year + i as i32, *v))
    }

    /// Apply `f` to every value, keeping the year range.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            start_year: self.start_year,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn covers(&self, horizon: &Horizon) -> bool {
        self.start_year == horizon.start() && self.end_year() == Some(horizon.end())
    }
}

/// A trend model that extrapolates a yearly series over a horizon.
pub trait ForecastModel {
    fn name(&self) -> &str;

    fn method(&self) -> ForecastMethod;

    /// Fit on `series` and return one value per horizon year.
    fn fit_forecast(&self, series: &Series, horizon: &Horizon) -> Result<PointForecast>;
}

/// Method that produced a base forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// Additive damped-trend exponential smoothing.
    DampedTrend,
    /// Ordinary least squares line over the years.
    LinearTrend,
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastMethod::DampedTrend => f.write_str("damped_trend"),
            ForecastMethod::LinearTrend => f.write_str("linear_trend"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Conservative,
    Medium,
    Optimistic,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::Conservative,
        Scenario::Medium,
        Scenario::Optimistic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Conservative => "conservative",
            Scenario::Medium => "medium",
            Scenario::Optimistic => "optimistic",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conservative" => Ok(Scenario::Conservative),
            "medium" => Ok(Scenario::Medium),
            "optimistic" => Ok(Scenario::Optimistic),
            other => Err(ForecastError::InvalidInput(format!(
                "unknown scenario '{other}'"
            ))),
        }
    }
}

/// The three scenario bands derived from one base forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub conservative: PointForecast,
    pub medium: PointForecast,
    pub optimistic: PointForecast,
}

impl ScenarioSet {
    pub fn get(&self, scenario: Scenario) -> &PointForecast {
        match scenario {
            Scenario::Conservative => &self.conservative,
            Scenario::Medium => &self.medium,
            Scenario::Optimistic => &self.optimistic,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Scenario, &PointForecast)> {
        Scenario::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

/// Persisted prediction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub region_code: String,
    pub region_label: String,
    pub category: String,
    pub scenario: Scenario,
    pub year: i32,
    pub predicted_total: f64,
    pub created_at: NaiveDateTime,
}

/// Categories a run reads and replaces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryScope {
    #[default]
    All,
    Only(Vec<String>),
}

impl CategoryScope {
    pub fn includes(&self, category: &str) -> bool {
        match self {
            CategoryScope::All => true,
            CategoryScope::Only(categories) => categories.iter().any(|c| c == category),
        }
    }
}
