//! Benchmarks for windowing hot paths.
//!
//! Run with: cargo bench -p core-window --bench visible_range_bench

use core_events::ViewportMetrics;
use core_window::{SizeTable, SurfaceSlot, WindowConfig, WindowRenderer};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_compute_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("window/compute_range");
    let slot = SurfaceSlot::new();

    for len in [1_000usize, 100_000, 1_000_000] {
        let mut r = WindowRenderer::configure(len, WindowConfig::default(), &slot);
        for i in (0..len).step_by(7) {
            r.report_measured_size(i, 90.0);
        }
        let total = r.total_height();
        group.bench_with_input(BenchmarkId::new("middle", len), &r, |b, r| {
            b.iter(|| {
                black_box(r.compute_range(&ViewportMetrics::new(total / 2.0, 900.0, total)))
            })
        });
    }

    group.finish();
}

fn bench_measure(c: &mut Criterion) {
    let mut group = c.benchmark_group("window/measure");

    for len in [1_000usize, 100_000] {
        group.bench_with_input(BenchmarkId::new("set", len), &len, |b, &len| {
            let mut table = SizeTable::with_len(64.0, len);
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % len;
                black_box(table.set(i, 40.0 + (i % 50) as f64))
            })
        });
        group.bench_with_input(BenchmarkId::new("append", len), &len, |b, &len| {
            b.iter(|| {
                let mut table = SizeTable::new(64.0);
                table.set_len(len);
                black_box(table.total())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compute_range, bench_measure);
criterion_main!(benches);
