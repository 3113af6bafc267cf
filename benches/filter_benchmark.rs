use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use trailstreak::models::GeoSample;
use trailstreak::services::{GeoSampleFilter, RunSessionMachine};

/// A 5 km out-and-back trace at one fix per second, with periodic noise
/// and a few GPS jumps mixed in.
fn synthetic_trace(points: usize) -> Vec<GeoSample> {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap();
    (0..points)
        .map(|i| {
            let meters = (i as f64 * 2.8) % 5000.0;
            let jump = if i % 997 == 0 { 0.005 } else { 0.0 };
            GeoSample {
                latitude: 37.0 + meters / 111_195.0 + jump,
                longitude: -122.0 + (i as f64 * 0.1).sin() * 1e-5,
                horizontal_accuracy_meters: if i % 50 == 0 { 40.0 } else { 6.0 },
                timestamp: start + chrono::Duration::seconds(i as i64),
                instant_speed_mps: Some(2.8),
            }
        })
        .collect()
}

fn benchmark_filter(c: &mut Criterion) {
    let trace = synthetic_trace(3600);
    let filter = GeoSampleFilter;

    let mut group = c.benchmark_group("geo_filter");

    group.bench_function("evaluate_hour_of_samples", |b| {
        b.iter(|| {
            let mut previous: Option<&GeoSample> = None;
            let mut route: Vec<GeoSample> = Vec::new();
            for sample in &trace {
                let decision = filter.evaluate(black_box(sample), previous, &route);
                if decision.append_to_route {
                    route.push(sample.clone());
                }
                if decision.accepted {
                    previous = Some(sample);
                }
            }
            route.len()
        })
    });

    group.bench_function("session_machine_hour_of_ticks", |b| {
        b.iter(|| {
            let start = trace[0].timestamp;
            let mut machine =
                RunSessionMachine::new("bench".into(), "bench".into(), start, 10.0);
            let _ = machine.start(start);
            for sample in &trace {
                machine.ingest(black_box(sample.clone()));
                machine.tick();
            }
            machine.snapshot().distance_meters
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_filter);
criterion_main!(benches);
