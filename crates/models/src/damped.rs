//! Additive damped-trend exponential smoothing (Holt's method with damping).
//!
//! Smoothing parameters and the initial level/trend are all estimated from
//! the data by a bounded Nelder-Mead search over the in-sample one-step SSE.
//! Years missing between the first and last observation are carried through
//! the filter as unobserved slots.

use common::{
    ForecastError, ForecastMethod, ForecastModel, Horizon, OptimizerConfig, PointForecast, Result,
    Series,
};
use tracing::debug;

// ---------------------------------------------------------------------------
// Type definitions
// ---------------------------------------------------------------------------

/// Smoothing parameters, initial states in original price units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampedParams {
    pub alpha: f64,
    pub beta: f64,
    pub phi: f64,
    pub initial_level: f64,
    pub initial_trend: f64,
}

/// Result of fitting the model to one series.
#[derive(Debug, Clone)]
pub struct FittedDampedTrend {
    params: DampedParams,
    level: f64,
    trend: f64,
    last_year: i32,
    sse: f64,
    iterations: usize,
}

impl FittedDampedTrend {
    pub fn params(&self) -> &DampedParams {
        &self.params
    }

    pub fn last_year(&self) -> i32 {
        self.last_year
    }

    /// In-sample one-step SSE in price units.
    pub fn sse(&self) -> f64 {
        self.sse
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Forecast `steps` years after the last observation.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let phi = self.params.phi;
        let mut damping = 0.0;
        let mut phi_h = 1.0;
        (1..=steps)
            .map(|_| {
                phi_h *= phi;
                damping += phi_h;
                self.level + damping * self.trend
            })
            .collect()
    }
}

/// Damped additive trend model, no seasonality.
#[derive(Debug, Clone)]
pub struct DampedTrendModel {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for DampedTrendModel {
    fn default() -> Self {
        Self::new(&OptimizerConfig::default())
    }
}

// Parameter bounds. Level/trend bounds are in scaled units (|y| <= 1).
const ALPHA_BOUNDS: (f64, f64) = (1e-4, 0.9999);
const BETA_BOUNDS: (f64, f64) = (1e-4, 0.9999);
const PHI_BOUNDS: (f64, f64) = (0.8, 0.98);
const TREND_BOUND: f64 = 1.0;

/// Longest first-to-last year span the filter will lay out.
const MAX_SPAN_YEARS: i32 = 500;

impl DampedTrendModel {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }

    /// Estimate parameters and run the filter over `points`.
    ///
    /// `points` must be sorted by strictly increasing year.
    pub fn fit(&self, points: &[(i32, f64)]) -> Result<FittedDampedTrend> {
        let (first_year, last_year) = match (points.first(), points.last()) {
            (Some(first), Some(last)) if points.len() >= 2 => (first.0, last.0),
            _ => {
                return Err(ForecastError::InsufficientData(
                    "damped trend requires at least 2 data points".into(),
                ))
            }
        };

        let scale = points
            .iter()
            .map(|(_, v)| v.abs())
            .fold(0.0_f64, f64::max);
        let scale = if scale > 1e-12 { scale } else { 1.0 };

        let slots = annual_slots(points, first_year, last_year, scale)?;

        let observed: Vec<f64> = slots.iter().flatten().copied().collect();
        let min = observed.iter().copied().fold(f64::INFINITY, f64::min);
        let max = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let initial_trend = initial_slope(&slots).clamp(-TREND_BOUND, TREND_BOUND);
        let initial_level = observed[0] - initial_trend;

        let bounds = NelderMeadBounds {
            lower: vec![
                ALPHA_BOUNDS.0,
                BETA_BOUNDS.0,
                PHI_BOUNDS.0,
                min - 1.0,
                -TREND_BOUND,
            ],
            upper: vec![
                ALPHA_BOUNDS.1,
                BETA_BOUNDS.1,
                PHI_BOUNDS.1,
                max + 1.0,
                TREND_BOUND,
            ],
        };
        let initial = [0.5, 0.1, 0.9, initial_level, initial_trend];

        debug!(
            data_length = points.len(),
            slots = slots.len(),
            scale = scale,
            "Damped trend fitting"
        );

        let optimum = nelder_mead(
            |raw| {
                let sse = filter(&slots, &ScaledParams::from_raw(raw)).sse;
                if sse.is_finite() {
                    sse
                } else {
                    f64::MAX
                }
            },
            &initial,
            &bounds,
            self.max_iterations,
            self.tolerance,
        );

        if !optimum.converged {
            return Err(ForecastError::FitFailure(format!(
                "optimizer did not converge within {} iterations",
                self.max_iterations
            )));
        }

        let params = ScaledParams::from_raw(&optimum.point);
        let state = filter(&slots, &params);
        if !state.sse.is_finite() || !state.level.is_finite() || !state.trend.is_finite() {
            return Err(ForecastError::FitFailure(format!(
                "non-finite state after fit (sse={}, level={}, trend={})",
                state.sse, state.level, state.trend
            )));
        }

        let fitted = FittedDampedTrend {
            params: DampedParams {
                alpha: params.alpha,
                beta: params.beta,
                phi: params.phi,
                initial_level: params.level0 * scale,
                initial_trend: params.trend0 * scale,
            },
            level: state.level * scale,
            trend: state.trend * scale,
            last_year,
            sse: state.sse * scale * scale,
            iterations: optimum.iterations,
        };

        debug!(
            alpha = fitted.params.alpha,
            beta = fitted.params.beta,
            phi = fitted.params.phi,
            sse = fitted.sse,
            iterations = fitted.iterations,
            "Damped trend fitted"
        );

        Ok(fitted)
    }
}

impl ForecastModel for DampedTrendModel {
    fn name(&self) -> &str {
        "DampedTrend"
    }

    fn method(&self) -> ForecastMethod {
        ForecastMethod::DampedTrend
    }

    fn fit_forecast(&self, series: &Series, horizon: &Horizon) -> Result<PointForecast> {
        let fitted = self.fit(series.points())?;
        let steps = horizon.steps_after(fitted.last_year())?;
        let path = fitted.forecast(steps);

        if let Some(i) = path.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::FitFailure(format!(
                "{}: non-finite forecast at step {}",
                series.key(),
                i + 1
            )));
        }

        let skip = steps - horizon.len();
        Ok(PointForecast::new(horizon.start(), path[skip..].to_vec()))
    }
}

// ---------------------------------------------------------------------------
// State filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ScaledParams {
    alpha: f64,
    beta: f64,
    phi: f64,
    level0: f64,
    trend0: f64,
}

impl ScaledParams {
    fn from_raw(raw: &[f64]) -> Self {
        Self {
            alpha: raw[0],
            beta: raw[1],
            phi: raw[2],
            level0: raw[3],
            trend0: raw[4],
        }
    }
}

struct FilterState {
    level: f64,
    trend: f64,
    sse: f64,
}

/// One value per year from `first_year` to `last_year`, `None` where the
/// year has no observation. Values are divided by `scale`.
///
/// Spans of `MAX_SPAN_YEARS` or more are rejected as `InvalidInput`.
fn annual_slots(
    points: &[(i32, f64)],
    first_year: i32,
    last_year: i32,
    scale: f64,
) -> Result<Vec<Option<f64>>> {
    let span = match last_year.checked_sub(first_year) {
        Some(span) if (0..MAX_SPAN_YEARS).contains(&span) => span as usize,
        _ => {
            return Err(ForecastError::InvalidInput(format!(
                "year range {first_year}..={last_year} is not within {MAX_SPAN_YEARS} years"
            )))
        }
    };
    let mut slots = vec![None; span + 1];
    for &(year, value) in points {
        let offset = year
            .checked_sub(first_year)
            .and_then(|offset| usize::try_from(offset).ok())
            .filter(|&offset| offset <= span)
            .ok_or_else(|| {
                ForecastError::InvalidInput(format!(
                    "year {year} outside {first_year}..={last_year}"
                ))
            })?;
        slots[offset] = Some(value / scale);
    }
    Ok(slots)
}

/// Average year-over-year change between the first and last observation.
fn initial_slope(slots: &[Option<f64>]) -> f64 {
    let first = slots.iter().position(Option::is_some);
    let last = slots.iter().rposition(Option::is_some);
    match (first, last) {
        (Some(i), Some(j)) if j > i => match (slots[i], slots[j]) {
            (Some(a), Some(b)) => (b - a) / (j - i) as f64,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

fn filter(slots: &[Option<f64>], params: &ScaledParams) -> FilterState {
    let ScaledParams {
        alpha,
        beta,
        phi,
        level0,
        trend0,
    } = *params;

    let mut level = level0;
    let mut trend = trend0;
    let mut sse = 0.0;

    for slot in slots {
        let prediction = level + phi * trend;
        match slot {
            Some(y) => {
                let error = y - prediction;
                sse += error * error;

                let prev_level = level;
                level = alpha * y + (1.0 - alpha) * prediction;
                trend = beta * (level - prev_level) + (1.0 - beta) * phi * trend;
            }
            None => {
                level = prediction;
                trend *= phi;
            }
        }
    }

    FilterState { level, trend, sse }
}

// ---------------------------------------------------------------------------
// Bounded Nelder-Mead
// ---------------------------------------------------------------------------

struct NelderMeadBounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl NelderMeadBounds {
    fn clamp(&self, mut point: Vec<f64>) -> Vec<f64> {
        for ((v, lo), hi) in point.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(*lo, *hi);
        }
        point
    }
}

struct Optimum {
    point: Vec<f64>,
    iterations: usize,
    converged: bool,
}

struct Vertex {
    point: Vec<f64>,
    value: f64,
}

/// `centroid + t * (from - centroid)`: `t = -1` reflects `from`, `t = 0.5`
/// halves the distance.
fn along(centroid: &[f64], from: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(from)
        .map(|(c, x)| c + t * (x - c))
        .collect()
}

/// Simplex of `dim + 1` clamped vertices, kept sorted best first.
struct Simplex<'a, F> {
    objective: F,
    bounds: &'a NelderMeadBounds,
    vertices: Vec<Vertex>,
}

impl<'a, F> Simplex<'a, F>
where
    F: Fn(&[f64]) -> f64,
{
    /// Start at `initial` plus one vertex per axis, offset by a tenth of
    /// that axis' range (downwards when the upper bound is hit).
    fn new(objective: F, initial: &[f64], bounds: &'a NelderMeadBounds) -> Self {
        let origin = bounds.clamp(initial.to_vec());
        let mut points = vec![origin.clone()];
        for (i, &x) in origin.iter().enumerate() {
            let (lo, hi) = (bounds.lower[i], bounds.upper[i]);
            let step = 0.1 * (hi - lo);
            let up = (x + step).min(hi);
            let mut point = origin.clone();
            point[i] = if up - x > 1e-12 { up } else { (x - step).max(lo) };
            points.push(point);
        }

        let mut simplex = Self {
            objective,
            bounds,
            vertices: Vec::with_capacity(points.len()),
        };
        for point in points {
            let vertex = simplex.evaluate(point);
            simplex.vertices.push(vertex);
        }
        simplex.sort();
        simplex
    }

    fn evaluate(&self, point: Vec<f64>) -> Vertex {
        let point = self.bounds.clamp(point);
        let value = (self.objective)(&point);
        Vertex { point, value }
    }

    fn sort(&mut self) {
        self.vertices.sort_by(|a, b| a.value.total_cmp(&b.value));
    }

    fn best(&self) -> &Vertex {
        &self.vertices[0]
    }

    fn worst(&self) -> &Vertex {
        &self.vertices[self.vertices.len() - 1]
    }

    /// Objective spread within `tol * (1 + |f_best|)` or best-to-worst
    /// diameter below `tol`.
    fn converged(&self, tol: f64) -> bool {
        let (best, worst) = (self.best(), self.worst());
        let spread = (worst.value - best.value).abs();
        let diameter = best
            .point
            .iter()
            .zip(&worst.point)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        spread <= tol * (1.0 + best.value.abs()) || diameter < tol
    }

    /// Mean of every vertex except the worst.
    fn centroid(&self) -> Vec<f64> {
        let kept = &self.vertices[..self.vertices.len() - 1];
        let mut centroid = vec![0.0; self.best().point.len()];
        for vertex in kept {
            for (c, x) in centroid.iter_mut().zip(&vertex.point) {
                *c += x;
            }
        }
        let count = kept.len() as f64;
        centroid.iter_mut().for_each(|c| *c /= count);
        centroid
    }

    /// Replace the worst vertex by a reflected, expanded or contracted
    /// candidate, or shrink everything towards the best vertex.
    fn step(&mut self) {
        let n = self.vertices.len();
        let centroid = self.centroid();
        let reflected = self.evaluate(along(&centroid, &self.worst().point, -1.0));

        let replacement = if reflected.value < self.best().value {
            let expanded = self.evaluate(along(&centroid, &reflected.point, 2.0));
            Some(if expanded.value < reflected.value {
                expanded
            } else {
                reflected
            })
        } else if reflected.value < self.vertices[n - 2].value {
            Some(reflected)
        } else {
            let anchor = if reflected.value < self.worst().value {
                reflected
            } else {
                let worst = self.worst();
                Vertex {
                    point: worst.point.clone(),
                    value: worst.value,
                }
            };
            let contracted = self.evaluate(along(&centroid, &anchor.point, 0.5));
            (contracted.value < anchor.value).then_some(contracted)
        };

        match replacement {
            Some(vertex) => self.vertices[n - 1] = vertex,
            None => self.shrink(),
        }
        self.sort();
    }

    fn shrink(&mut self) {
        let best = self.best().point.clone();
        for i in 1..self.vertices.len() {
            let vertex = self.evaluate(along(&best, &self.vertices[i].point, 0.5));
            self.vertices[i] = vertex;
        }
    }

    fn into_optimum(self, iterations: usize, converged: bool) -> Optimum {
        let point = self
            .vertices
            .into_iter()
            .next()
            .map(|v| v.point)
            .unwrap_or_default();
        Optimum {
            point,
            iterations,
            converged,
        }
    }
}

/// Minimise `f` inside `bounds`, starting from `initial`.
fn nelder_mead<F>(
    f: F,
    initial: &[f64],
    bounds: &NelderMeadBounds,
    max_iter: usize,
    tol: f64,
) -> Optimum
where
    F: Fn(&[f64]) -> f64,
{
    let mut simplex = Simplex::new(f, initial, bounds);
    for iteration in 0..max_iter {
        if simplex.converged(tol) {
            return simplex.into_optimum(iteration, true);
        }
        simplex.step();
    }
    simplex.into_optimum(max_iter, false)
}
