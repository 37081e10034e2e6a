//! Field append/read benchmarks for coltree
//!
//! These benchmarks measure the per-entry cost of the serialization hot
//! paths: mapped leaves, records, and offset-column collections.

use coltree::{Datum, Field, LeafKind, MemoryPages, PageSink, SharedSink, SharedSource};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_lot::Mutex;
use std::sync::Arc;

fn leaf_writer() -> (Arc<Mutex<MemoryPages>>, Field) {
    let store = Arc::new(Mutex::new(MemoryPages::new()));
    let mut field = Field::leaf("e", LeafKind::F64).unwrap();
    let sink: SharedSink = store.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    (store, field)
}

fn bench_leaf_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaf_append");

    group.bench_function("f64", |b| {
        let (_store, mut field) = leaf_writer();
        let mut value = field.generate_value().unwrap();
        field.encode(value.as_mut(), &Datum::F64(1.25)).unwrap();
        b.iter(|| black_box(field.append(value.as_ref()).unwrap()));
    });

    group.finish();
}

fn bench_leaf_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaf_read");

    let (store, mut field) = leaf_writer();
    let mut value = field.generate_value().unwrap();
    for i in 0..1024 {
        field
            .encode(value.as_mut(), &Datum::F64(i as f64))
            .unwrap();
        field.append(value.as_ref()).unwrap();
    }
    store.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("e").unwrap();
    let source: SharedSource = store.clone();
    reader.connect_page_source(&source).unwrap();

    group.bench_function("f64_single", |b| {
        let mut i = 0u64;
        b.iter(|| {
            reader.read(black_box(i % 1024), value.as_mut()).unwrap();
            i += 1;
        });
    });

    group.bench_function("f64_bulk_256", |b| {
        let mut bulk = reader.generate_bulk();
        let mask = vec![true; 256];
        b.iter(|| {
            reader
                .read_bulk_into(&mut bulk, coltree::ClusterIndex::new(0, 0), 256, &mask)
                .unwrap();
            black_box(bulk.n_valid());
        });
    });

    group.finish();
}

fn bench_vector_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector");

    group.bench_function("append_16_f32", |b| {
        let store = Arc::new(Mutex::new(MemoryPages::new()));
        let mut field =
            Field::vector("v", Field::leaf("x", LeafKind::F32).unwrap()).unwrap();
        let sink: SharedSink = store.clone();
        field.connect_page_sink(&sink, 0).unwrap();
        let items: Vec<Datum> = (0..16).map(|i| Datum::F32(i as f32)).collect();
        let mut value = field.generate_value().unwrap();
        field.encode(value.as_mut(), &Datum::Vector(items)).unwrap();
        b.iter(|| black_box(field.append(value.as_ref()).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_leaf_append,
    bench_leaf_read,
    bench_vector_round_trip
);
criterion_main!(benches);
