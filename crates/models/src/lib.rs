mod damped;
mod linear;

pub use damped::{DampedParams, DampedTrendModel, FittedDampedTrend};
pub use linear::{LinearFit, LinearTrendModel};
