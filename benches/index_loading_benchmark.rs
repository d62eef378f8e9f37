use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nsdb_core::core::types::{Record, Value};
use nsdb_core::index::engine::IndexEngine;
use nsdb_core::index::query::IndexQuery;
use nsdb_core::index::store::LocationIndex;
use nsdb_core::storage::layout::StorageLayout;
use std::sync::Arc;
use tempfile::tempdir;

fn seeded_location_file(dir: &std::path::Path, record_count: usize) -> std::path::PathBuf {
    let path = dir.join("records.bin");
    let mut index = LocationIndex::load_or_create(path.clone()).unwrap();
    index.open_writer().unwrap();
    for i in 0..record_count {
        index.write(
            Record::new(i as i64, Value::Float(i as f64))
                .with_tag("city", Value::String(format!("city-{}", i % 8))),
        );
    }
    index.flush().unwrap();
    path
}

/// Cost of deserializing a location's full slot list from disk, at a few sizes.
fn bench_location_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("location_load");
    for record_count in [100usize, 1_000, 10_000].iter() {
        let dir = tempdir().unwrap();
        let path = seeded_location_file(dir.path(), *record_count);
        group.bench_with_input(
            BenchmarkId::from_parameter(record_count),
            record_count,
            |b, _| {
                b.iter(|| {
                    let index = LocationIndex::load_or_create(path.clone()).unwrap();
                    black_box(index);
                });
            },
        );
    }
    group.finish();
}

/// Cost of a full scan query over an in-memory, already-loaded location.
fn bench_location_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("location_query");
    for record_count in [100usize, 1_000, 10_000].iter() {
        let dir = tempdir().unwrap();
        let path = seeded_location_file(dir.path(), *record_count);
        let index = LocationIndex::load_or_create(path).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(record_count),
            record_count,
            |b, _| {
                b.iter(|| {
                    let results = index.query(
                        &IndexQuery::Term {
                            field: "city".to_string(),
                            value: Value::String("city-3".to_string()),
                        },
                        None,
                        None,
                    );
                    black_box(results);
                });
            },
        );
    }
    group.finish();
}

/// `IndexEngine` holds an LRU cache of open locations keyed by (db, namespace, metric,
/// location_id); compares a cold open (disk deserialize) against a warm one (cache hit).
fn bench_engine_cache(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let layout = Arc::new(StorageLayout::new(dir.path().to_path_buf()));
    seeded_location_file(
        &layout.location_dir("bench", "ns", "requests", "0_999"),
        2_000,
    );

    let mut group = c.benchmark_group("engine_cache");

    group.bench_function("cold_open", |b| {
        b.iter(|| {
            let engine = IndexEngine::new(layout.clone(), 4);
            let handle = engine.open("bench", "ns", "requests", "0_999").unwrap();
            black_box(handle);
        });
    });

    let warm_engine = IndexEngine::new(layout.clone(), 4);
    warm_engine.open("bench", "ns", "requests", "0_999").unwrap();
    group.bench_function("warm_open", |b| {
        b.iter(|| {
            let handle = warm_engine.open("bench", "ns", "requests", "0_999").unwrap();
            black_box(handle);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_location_load, bench_location_query, bench_engine_cache);
criterion_main!(benches);
