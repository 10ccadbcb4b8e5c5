//! Canvas state persistence benchmarks.

use canvas_sync_bench::growing_log;
use canvas_sync_protocol::{decode_state, encode_state};
use canvas_sync_storage::{FileStore, InMemoryStore, KeyValueStore};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const KEY: &str = "canvas-state:bench";

/// Benchmark CBOR encoding and decoding of whole states.
fn bench_state_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_codec");

    for len in [10, 100, 1000].iter() {
        let state = growing_log(*len);
        let bytes = encode_state(&state).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", len), &state, |b, state| {
            b.iter(|| black_box(encode_state(black_box(state)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &bytes, |b, bytes| {
            b.iter(|| black_box(decode_state(black_box(bytes)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark the read-modify-write a capture performs.
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    // Use larger sample size for file operations
    group.sample_size(50);

    let bytes = encode_state(&growing_log(100)).unwrap();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("in_memory", |b| {
        let store = InMemoryStore::new();
        store.set(KEY, &bytes).unwrap();
        b.iter(|| {
            let written = store
                .update(KEY, &mut |current| current.map(<[u8]>::to_vec))
                .unwrap();
            black_box(written);
        });
    });

    group.bench_function("file", |b| {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.set(KEY, &bytes).unwrap();
        b.iter(|| {
            let written = store
                .update(KEY, &mut |current| current.map(<[u8]>::to_vec))
                .unwrap();
            black_box(written);
        });
    });

    group.finish();
}

/// Benchmark an update that declines to write.
fn bench_declined_update(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    store.set(KEY, &encode_state(&growing_log(100)).unwrap()).unwrap();

    c.bench_function("file_update_declined", |b| {
        b.iter(|| black_box(store.update(KEY, &mut |_| None).unwrap()));
    });
}

criterion_group!(benches, bench_state_codec, bench_update, bench_declined_update);

criterion_main!(benches);
