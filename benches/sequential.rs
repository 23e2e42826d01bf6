use criterion::{black_box, criterion_group, criterion_main, BatchSize, Bencher, Criterion, Throughput};
use logcask::Config;
use pprof::criterion::{Output, PProfProfiler};
use rand::prelude::*;
use tempfile::TempDir;

const ITER: usize = 10_000;
const KEY_SIZE: usize = 64;
const VAL_SIZE: usize = 1024;

fn prebuilt_kv_pairs(n: usize, key_size: usize, val_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(0);
    (0..n)
        .map(|_| {
            let key: Vec<u8> = (0..key_size).map(|_| rng.gen()).collect();
            let val: Vec<u8> = (0..val_size).map(|_| rng.gen()).collect();
            (key, val)
        })
        .collect()
}

fn open_engine() -> (logcask::Engine, TempDir) {
    let tmpdir = TempDir::new().unwrap();
    let engine = Config::new(tmpdir.path()).open().unwrap();
    (engine, tmpdir)
}

/// Sequential `put` of `ITER` distinct keys against a fresh engine.
pub fn bench_sequential_write(c: &mut Criterion) {
    let kv_pairs = prebuilt_kv_pairs(ITER, KEY_SIZE, VAL_SIZE);
    let nbytes: usize = kv_pairs.iter().map(|(k, v)| k.len() + v.len()).sum();

    let mut g = c.benchmark_group("sequential_write");
    g.throughput(Throughput::Bytes(nbytes as u64));
    g.bench_function("put", |b: &mut Bencher| {
        b.iter_batched(
            || {
                let (engine, tmpdir) = open_engine();
                (engine, kv_pairs.clone(), tmpdir)
            },
            |(engine, pairs, _tmpdir)| {
                for (k, v) in pairs {
                    black_box(engine.put(k, v).unwrap());
                }
            },
            BatchSize::SmallInput,
        );
    });
    g.finish();
}

/// Sequential `get` of every key already written to a warmed-up engine.
pub fn bench_sequential_read(c: &mut Criterion) {
    let kv_pairs = prebuilt_kv_pairs(ITER, KEY_SIZE, VAL_SIZE);
    let nbytes: usize = kv_pairs.iter().map(|(k, v)| k.len() + v.len()).sum();

    let (engine, _tmpdir) = open_engine();
    for (k, v) in &kv_pairs {
        engine.put(k.clone(), v.clone()).unwrap();
    }

    let mut g = c.benchmark_group("sequential_read");
    g.throughput(Throughput::Bytes(nbytes as u64));
    g.bench_function("get", |b: &mut Bencher| {
        b.iter(|| {
            for (k, _) in &kv_pairs {
                black_box(engine.get(k).unwrap());
            }
        });
    });
    g.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = bench_sequential_write, bench_sequential_read
}
criterion_main!(benches);
