use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use parvec::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

const N: u64 = 1 << 16;
const HALF: u64 = N / 2;
const BAND: u64 = 64;

/// Assemble a two-rank partition pair; each rank ghosts a band of indices
/// across the split point. Assembly is collective, so it runs on two
/// threads.
fn build_pair() -> (Arc<Partition>, Arc<Partition>) {
    let h0 = std::thread::spawn(|| {
        let ghosts: Vec<u64> = (HALF..HALF + BAND).collect();
        Partition::assemble(N, 0..HALF, ghosts, &ThreadComm::new(0, 2), 0, 2).unwrap()
    });
    let h1 = std::thread::spawn(|| {
        let ghosts: Vec<u64> = (HALF - BAND..HALF).collect();
        Partition::assemble(N, HALF..N, ghosts, &ThreadComm::new(1, 2), 1, 2).unwrap()
    });
    (
        Arc::new(h0.join().unwrap()),
        Arc::new(h1.join().unwrap()),
    )
}

fn bench_ghost_update(c: &mut Criterion) {
    let (p0, p1) = build_pair();
    let c0 = ThreadComm::new(0, 2);
    let c1 = ThreadComm::new(1, 2);
    let mut v0 = Vector::<f64>::new(p0).unwrap();
    let mut v1 = Vector::<f64>::new(p1).unwrap();
    for g in 0..HALF {
        v0.set(g, g as f64).unwrap();
    }
    for g in HALF..N {
        v1.set(g, g as f64).unwrap();
    }

    // Both starts are posted before either finish, so a single driving
    // thread cannot deadlock the symmetric exchange.
    c.bench_function("ghost_update/two_ranks_band64", |b| {
        b.iter(|| {
            let g0 = v0.update_ghost_values_start(&c0).unwrap();
            let g1 = v1.update_ghost_values_start(&c1).unwrap();
            g0.finish().unwrap();
            g1.finish().unwrap();
        })
    });

    c.bench_function("compress_add/two_ranks_band64", |b| {
        b.iter(|| {
            for s in 0..BAND {
                v0.add(HALF + s, 1.0).unwrap();
                v1.add(HALF - 1 - s, 1.0).unwrap();
            }
            let g0 = v0.compress_start(CompressMode::Add, &c0).unwrap();
            let g1 = v1.compress_start(CompressMode::Add, &c1).unwrap();
            g0.finish().unwrap();
            g1.finish().unwrap();
        })
    });
}

fn bench_arithmetic(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut x = Vector::<f64>::serial(N).unwrap();
    let mut y = Vector::<f64>::serial(N).unwrap();
    for g in 0..N {
        x.set(g, rng.gen_range(-1.0..1.0)).unwrap();
        y.set(g, 1.0).unwrap();
    }

    c.bench_function("axpy/serial_64k", |b| {
        b.iter(|| y.add_scaled(1.0e-9, &x).unwrap())
    });

    c.bench_function("l2_norm/serial_64k", |b| {
        b.iter(|| x.l2_norm(&NoComm).unwrap())
    });
}

criterion_group!(benches, bench_ghost_update, bench_arithmetic);
criterion_main!(benches);
