//! Benchmarks for change propagation
//!
//! Run with: cargo bench -p lattice-reactive --bench propagation

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lattice_reactive::{atomic, Effect, Memo, Signal};

// =============================================================================
// Pull: validate a chain of memos
// =============================================================================

fn chain(source: &Signal<u64>, depth: usize) -> Memo<u64> {
    let mut tail = {
        let source = source.clone();
        Memo::new(move || source.get() + 1)
    };
    for _ in 1..depth {
        let prev = tail.clone();
        tail = Memo::new(move || prev.get().unwrap_or_default() + 1);
    }
    tail
}

fn bench_pull_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull/chain");

    for depth in [1usize, 10, 100] {
        let source = Signal::new(0u64);
        let tail = chain(&source, depth);
        group.throughput(Throughput::Elements(depth as u64));

        group.bench_with_input(BenchmarkId::new("clean", depth), &tail, |b, tail| {
            b.iter(|| black_box(tail.get()))
        });
        group.bench_with_input(BenchmarkId::new("changed", depth), &tail, |b, tail| {
            b.iter(|| {
                source.update(|v| v + 1);
                black_box(tail.get())
            })
        });
    }

    group.finish();
}

// =============================================================================
// Push: fan-out to watched memos
// =============================================================================

fn bench_push_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("push/fanout");

    for width in [1usize, 10, 100] {
        let source = Signal::new(0u64);
        let memos: Vec<_> = (0..width)
            .map(|n| {
                let source = source.clone();
                Memo::new(move || source.get() * n as u64)
            })
            .collect();
        let _subscriptions: Vec<_> = memos
            .iter()
            .filter_map(|memo| {
                memo.subscribe(|v| {
                    black_box(v);
                })
                .ok()
            })
            .collect();
        group.throughput(Throughput::Elements(width as u64));

        group.bench_function(BenchmarkId::new("set", width), |b| {
            b.iter(|| source.update(|v| v + 1))
        });
    }

    group.finish();
}

// =============================================================================
// Batching
// =============================================================================

fn bench_atomic(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic");

    for writes in [2usize, 16] {
        let signals: Vec<_> = (0..writes).map(|_| Signal::new(0u64)).collect();
        let _effect = {
            let signals = signals.clone();
            Effect::new(move || {
                black_box(signals.iter().map(Signal::get).sum::<u64>());
            })
        };

        group.bench_function(BenchmarkId::new("unbatched", writes), |b| {
            b.iter(|| {
                for signal in &signals {
                    signal.update(|v| v + 1);
                }
            })
        });
        group.bench_function(BenchmarkId::new("batched", writes), |b| {
            b.iter(|| {
                atomic(|| {
                    for signal in &signals {
                        signal.update(|v| v + 1);
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pull_chain, bench_push_fanout, bench_atomic);
criterion_main!(benches);
