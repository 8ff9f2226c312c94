//! Single-threaded cost of the storage and the raw SPSC engines.
//!
//! Compares against crossbeam-channel's bounded `try_send`/`try_recv`.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use relay_queue::ring::{FixedRing, FlexibleRing, Ring};
use relay_queue::spsc::{fixed, flexible};

#[allow(unused)]
#[derive(Debug, Clone, Copy)]
struct Medium([u64; 16]); // 128 bytes

// ============================================================================
// Push/pop pairs
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    group.bench_function("fixed_ring/u64", |b| {
        let mut ring = FixedRing::<u64, 1024>::new();
        b.iter(|| {
            ring.push(black_box(42)).unwrap();
            black_box(ring.pop().unwrap())
        });
    });

    group.bench_function("flexible_ring/u64", |b| {
        let mut ring = FlexibleRing::<u64>::new(1024);
        b.iter(|| {
            ring.push(black_box(42)).unwrap();
            black_box(ring.pop().unwrap())
        });
    });

    group.bench_function("spsc_fixed/u64", |b| {
        let (mut tx, mut rx) = fixed::ring_buffer::<u64, 1024>();
        b.iter(|| {
            tx.push(black_box(42)).unwrap();
            black_box(rx.pop().unwrap())
        });
    });

    group.bench_function("spsc_flexible/u64", |b| {
        let (mut tx, mut rx) = flexible::ring_buffer::<u64>(1024);
        b.iter(|| {
            tx.push(black_box(42)).unwrap();
            black_box(rx.pop().unwrap())
        });
    });

    group.bench_function("crossbeam_bounded/u64", |b| {
        let (tx, rx) = crossbeam_channel::bounded::<u64>(1024);
        b.iter(|| {
            tx.try_send(black_box(42)).unwrap();
            black_box(rx.try_recv().unwrap())
        });
    });

    group.bench_function("spsc_fixed/128b", |b| {
        let (mut tx, mut rx) = fixed::ring_buffer::<Medium, 1024>();
        let msg = Medium([0; 16]);
        b.iter(|| {
            tx.push(black_box(msg)).unwrap();
            black_box(rx.pop().unwrap())
        });
    });

    group.bench_function("crossbeam_bounded/128b", |b| {
        let (tx, rx) = crossbeam_channel::bounded::<Medium>(1024);
        let msg = Medium([0; 16]);
        b.iter(|| {
            tx.try_send(black_box(msg)).unwrap();
            black_box(rx.try_recv().unwrap())
        });
    });

    group.finish();
}

// ============================================================================
// Burst fill then drain
// ============================================================================

fn bench_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst");

    for n in [100usize, 1000] {
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("spsc_fixed", n), &n, |b, &n| {
            let (mut tx, mut rx) = fixed::ring_buffer::<u64, 2048>();
            b.iter(|| {
                for i in 0..n {
                    tx.push(black_box(i as u64)).unwrap();
                }
                for _ in 0..n {
                    black_box(rx.pop().unwrap());
                }
            });
        });

        // Starts small so each burst crosses segment boundaries.
        group.bench_with_input(BenchmarkId::new("spsc_flexible", n), &n, |b, &n| {
            let (mut tx, mut rx) = flexible::ring_buffer::<u64>(16);
            b.iter(|| {
                for i in 0..n {
                    tx.push(black_box(i as u64)).unwrap();
                }
                for _ in 0..n {
                    black_box(rx.pop().unwrap());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("flexible_ring", n), &n, |b, &n| {
            let mut ring = FlexibleRing::<u64>::new(16);
            b.iter(|| {
                for i in 0..n {
                    ring.push(black_box(i as u64)).unwrap();
                }
                for _ in 0..n {
                    black_box(ring.pop().unwrap());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("crossbeam_bounded", n), &n, |b, &n| {
            let (tx, rx) = crossbeam_channel::bounded::<u64>(2048);
            b.iter(|| {
                for i in 0..n {
                    tx.try_send(black_box(i as u64)).unwrap();
                }
                for _ in 0..n {
                    black_box(rx.try_recv().unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_burst);
criterion_main!(benches);
