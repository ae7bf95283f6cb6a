//! Benchmarks for binding evaluation.
//!
//! Run with: cargo bench -p lazybind --bench evaluate_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lazybind::{BindingEvaluator, Property, make_bound_property};
use std::hint::black_box;

// =============================================================================
// Chain: each binding reads the previous one
// =============================================================================

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator/chain");

    for depth in [1usize, 16, 128] {
        let ev = BindingEvaluator::new();
        let root = Property::new(0u64);
        let mut chain = vec![make_bound_property(&ev, &root + 1)];
        for _ in 1..depth {
            let next = make_bound_property(&ev, &chain[chain.len() - 1] + 1);
            chain.push(next);
        }
        let mut tick = 0u64;

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                tick = tick.wrapping_add(1);
                root.set(black_box(tick)).expect("independent");
                black_box(ev.evaluate_all().expect("acyclic"))
            })
        });
    }

    group.finish();
}

// =============================================================================
// Fan-out: many bindings read one source
// =============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator/fan_out");

    for width in [8usize, 64, 512] {
        let ev = BindingEvaluator::new();
        let source = Property::new(0i64);
        let bound: Vec<_> = (0..width as i64)
            .map(|k| make_bound_property(&ev, &source * k))
            .collect();
        let mut tick = 0i64;

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                tick = tick.wrapping_add(1);
                source.set(black_box(tick)).expect("independent");
                black_box(ev.evaluate_all().expect("acyclic"))
            })
        });
        drop(bound);
    }

    group.finish();
}

// =============================================================================
// Writes without evaluation
// =============================================================================

fn bench_mark_dirty(c: &mut Criterion) {
    let ev = BindingEvaluator::new();
    let source = Property::new(0u32);
    let _bound: Vec<_> = (0..64u32)
        .map(|k| make_bound_property(&ev, &source + k))
        .collect();
    let mut tick = 0u32;

    c.bench_function("evaluator/write_only_64_readers", |b| {
        b.iter(|| {
            tick = tick.wrapping_add(1);
            source.set(black_box(tick)).expect("independent");
        })
    });
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_mark_dirty);
criterion_main!(benches);
