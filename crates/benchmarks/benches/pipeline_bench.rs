//! Benchmarks for the batch forecast over many region/category pairs.

use common::{ForecastConfig, Observation};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use predictor::ForecastPipeline;

/// 26 cantons, `categories` categories, 2011-2024.
fn generate_history(categories: usize) -> Vec<Observation> {
    let mut rows = Vec::new();
    for canton in 1..=26 {
        for c in 0..categories {
            for (i, year) in (2011..=2024).enumerate() {
                let t = i as f64;
                let price = 15.0 + canton as f64 * 0.3 + c as f64 + 0.4 * t + (t + c as f64).cos();
                rows.push(Observation {
                    region_code: canton.to_string(),
                    region_label: format!("Canton {canton}"),
                    category: format!("C{}", c + 1),
                    year,
                    total_price: Some(price),
                });
            }
        }
    }
    rows
}

fn bench_forecast_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_forecast_all");
    group.sample_size(10);
    let pipeline = ForecastPipeline::new(ForecastConfig::default()).unwrap();

    for categories in [1, 2, 7] {
        let history = generate_history(categories);
        group.bench_with_input(
            BenchmarkId::from_parameter(categories * 26),
            &history,
            |b, rows| b.iter(|| pipeline.forecast_all(black_box(rows))),
        );
    }

    group.finish();
}

fn bench_fallback_only(c: &mut Criterion) {
    let config = ForecastConfig {
        primary_enabled: false,
        ..ForecastConfig::default()
    };
    let pipeline = ForecastPipeline::new(config).unwrap();
    let history = generate_history(2);

    c.bench_function("pipeline_fallback_only_52_pairs", |b| {
        b.iter(|| pipeline.forecast_all(black_box(&history)))
    });
}

criterion_group!(benches, bench_forecast_all, bench_fallback_only);
criterion_main!(benches);
