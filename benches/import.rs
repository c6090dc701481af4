//! Import benchmarks over synthetic laps.
//!
//! Run with: `cargo bench --bench import --features synthetic`
//!
//! Every lap of the same loop is conflated against the graph built by the
//! previous laps, so later laps are dominated by merges.

use criterion::{BatchSize, BenchmarkId, Criterion, SamplingMode, criterion_group, criterion_main};
use std::time::Duration;
use trackgraph::synthetic::LapScenario;
use trackgraph::{
    ConflationConfig, MatchPolicy, MemoryGraphStore, NodeIndex, ProximityRadius, SpatialIndex,
    TrackImporter, VecTrackSource,
};

fn meters_config(policy: MatchPolicy) -> ConflationConfig {
    ConflationConfig {
        radius: ProximityRadius::Meters(8.0),
        policy,
    }
}

// ============================================================================
// 1. Scaling with lap count
// ============================================================================

fn bench_lap_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("lap_scaling");
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_secs(3));
    group.sample_size(10);

    for laps in [5, 20, 50, 100] {
        let tracks = LapScenario::with_lap_count(laps).generate();

        group.bench_with_input(BenchmarkId::new("laps", laps), &tracks, |b, tracks| {
            b.iter_batched(
                || VecTrackSource::new(tracks.clone()),
                |mut source| {
                    let mut importer = TrackImporter::new(
                        MemoryGraphStore::new(),
                        NodeIndex::new(),
                        meters_config(MatchPolicy::UniqueNearest { tie_tolerance: 0.5 }),
                    );
                    importer.import_source(&mut source);
                    importer.index().len()
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// 2. Radius unit and match policy
// ============================================================================

fn bench_radius_and_policy(c: &mut Criterion) {
    let mut group = c.benchmark_group("radius_and_policy");
    group.sample_size(10);

    let tracks = LapScenario::with_lap_count(20).generate();
    let configs = [
        ("degrees_unique", ConflationConfig::with_radius(ProximityRadius::Degrees(0.0001))),
        ("meters_unique", meters_config(MatchPolicy::UniqueWithinRadius)),
        (
            "meters_nearest",
            meters_config(MatchPolicy::UniqueNearest { tie_tolerance: 0.5 }),
        ),
    ];

    for (name, config) in configs {
        group.bench_with_input(BenchmarkId::new("config", name), &config, |b, config| {
            b.iter_batched(
                || VecTrackSource::new(tracks.clone()),
                |mut source| {
                    let mut importer =
                        TrackImporter::new(MemoryGraphStore::new(), NodeIndex::new(), *config);
                    importer.import_source(&mut source)
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// 3. SQLite-backed import
// ============================================================================

#[cfg(feature = "persistence")]
fn bench_sqlite_import(c: &mut Criterion) {
    use trackgraph::SqliteGraphStore;

    let mut group = c.benchmark_group("sqlite_import");
    group.sample_size(10);

    let tracks = LapScenario::with_lap_count(10).generate();
    group.bench_function("in_memory_db", |b| {
        b.iter_batched(
            || VecTrackSource::new(tracks.clone()),
            |mut source| {
                let mut importer = TrackImporter::new(
                    SqliteGraphStore::in_memory().unwrap(),
                    NodeIndex::new(),
                    meters_config(MatchPolicy::UniqueWithinRadius),
                );
                importer.import_source(&mut source)
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

#[cfg(not(feature = "persistence"))]
fn bench_sqlite_import(_c: &mut Criterion) {}

// ============================================================================
// Main
// ============================================================================

criterion_group!(
    benches,
    bench_lap_scaling,
    bench_radius_and_policy,
    bench_sqlite_import,
);
criterion_main!(benches);
