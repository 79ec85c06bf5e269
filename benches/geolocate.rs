//! Benchmarks for the post-search pipeline: aggregation and gating.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geolocus::{
    aggregate_matches, decide_location_visibility, GateFlags, GeoConfig, Geolocator, Match,
};
use rand::prelude::*;

/// `n` ranked matches: a dense group around one landmark plus scattered confusers.
fn ranked_matches(n: usize, seed: u64) -> Vec<Match> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut matches: Vec<Match> = (0..n)
        .map(|i| {
            let (lat, lon) = if i % 3 == 0 {
                (rng.random_range(-50.0..60.0), rng.random_range(-170.0..170.0))
            } else {
                (
                    48.8584 + rng.random_range(-0.05..0.05),
                    2.2945 + rng.random_range(-0.05..0.05),
                )
            };
            Match::new(format!("m{i}"), "Eiffel Tower", lat, lon, rng.random_range(0.4..0.98))
        })
        .collect();
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    for (name, config) in [("standard", GeoConfig::standard()), ("ultra", GeoConfig::ultra())] {
        let matches = ranked_matches(config.search_depth, 1);
        group.bench_with_input(BenchmarkId::from_parameter(name), &matches, |b, m| {
            b.iter(|| aggregate_matches(black_box(m), &config).unwrap())
        });
    }
    group.finish();
}

fn bench_gate(c: &mut Criterion) {
    let matches = ranked_matches(24, 2);
    c.bench_function("visibility_gate", |b| {
        b.iter(|| {
            decide_location_visibility(black_box(0.7), black_box(&matches), GateFlags::default(), 0.65)
        })
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let locator = Geolocator::new(GeoConfig::standard());
    let matches = ranked_matches(24, 3);
    c.bench_function("locate_matches", |b| {
        b.iter(|| {
            locator
                .locate_matches(black_box(matches.clone()), GateFlags::default())
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_aggregate, bench_gate, bench_pipeline);
criterion_main!(benches);
