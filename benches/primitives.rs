//! Criterion benches for the hot primitive paths: slab allocation, indexed
//! inserts, and chain lookups over a populated table.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eyre::{ensure, Result};
use tempfile::tempdir;

use chainstore::{Element, FileStorage, HashMap, Link, Manager, Mode, Settings};

#[derive(Debug, Clone, Copy)]
struct Height(u32);

impl Element for Height {
    fn count(&self) -> Link {
        1
    }

    fn to_data(&self, sink: &mut [u8]) -> Result<()> {
        ensure!(sink.len() >= 4, "sink too small");
        sink[..4].copy_from_slice(&self.0.to_le_bytes());
        Ok(())
    }

    fn from_data(source: &[u8]) -> Result<Self> {
        ensure!(source.len() >= 4, "source too small");
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&source[..4]);
        Ok(Self(u32::from_le_bytes(raw)))
    }
}

fn key(seed: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.wrapping_mul(0x9e37_79b9_7f4a_7c15).to_le_bytes());
    key
}

fn bench_allocate(c: &mut Criterion) {
    c.bench_function("slab_allocate_64b", |b| {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("arena"), 1 << 20, 50).unwrap();
        storage.map().unwrap();
        let manager: Manager<5> = Manager::new(storage, Mode::Slab).unwrap();

        b.iter(|| black_box(manager.allocate(64).unwrap()));
    });
}

fn bench_put(c: &mut Criterion) {
    c.bench_function("hashmap_put", |b| {
        let dir = tempdir().unwrap();
        let settings = Settings::new(
            dir.path().join("bench.hdr"),
            dir.path().join("bench.body"),
        )
        .buckets(1 << 16)
        .key_size(32)
        .stride(4)
        .minimum(1 << 20);

        let map: HashMap<4> = HashMap::with_settings(&settings).unwrap();
        map.create().unwrap();

        let mut seed = 0u64;
        b.iter(|| {
            seed += 1;
            map.put(&key(seed), &Height(seed as u32)).unwrap();
        });
    });
}

fn bench_first(c: &mut Criterion) {
    c.bench_function("hashmap_first", |b| {
        let dir = tempdir().unwrap();
        let settings = Settings::new(
            dir.path().join("bench.hdr"),
            dir.path().join("bench.body"),
        )
        .buckets(1 << 16)
        .key_size(32)
        .stride(4)
        .minimum(1 << 20);

        let map: HashMap<4> = HashMap::with_settings(&settings).unwrap();
        map.create().unwrap();

        for seed in 0..100_000u64 {
            map.put(&key(seed), &Height(seed as u32)).unwrap();
        }

        let mut seed = 0u64;
        b.iter(|| {
            seed = (seed + 1) % 100_000;
            black_box(map.first(&key(seed)).unwrap());
        });
    });
}

criterion_group!(benches, bench_allocate, bench_put, bench_first);
criterion_main!(benches);
