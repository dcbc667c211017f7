//! Criterion benchmarks for the forecasting crates. Run with `cargo bench -p benchmarks`.
