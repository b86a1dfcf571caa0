//! Benchmarks for the per-tick work of the render loop
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meterlog::config::ReportOptions;
use meterlog::report::{build_report, ReportMetadata};
use meterlog::types::{DurableRow, Sample, SummaryStats};
use meterlog::view::{autoscale_bounds, scroll_bounds, TrendBuffer};

fn samples(count: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let t = i as f64 * 0.1;
            let value = if i % 97 == 0 { f64::NAN } else { (t * 0.7).sin() * 5.0 };
            Sample::new(t, value)
        })
        .collect()
}

fn bench_view_bounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_bounds");

    for size in [1000, 10_000, 100_000].iter() {
        let data = samples(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("autoscale", size), &data, |b, data| {
            b.iter(|| black_box(autoscale_bounds(black_box(data))))
        });

        group.bench_with_input(BenchmarkId::new("scroll_10s", size), &data, |b, data| {
            b.iter(|| black_box(scroll_bounds(black_box(data), 10.0)))
        });
    }

    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");

    for size in [1000, 10_000, 100_000].iter() {
        let data = samples(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("summary", size), &data, |b, data| {
            b.iter(|| black_box(SummaryStats::from_values(data.iter().map(|s| s.value))))
        });
    }

    group.finish();
}

fn bench_trend_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("trend_fill");
    let data = samples(10_000);
    group.throughput(Throughput::Elements(data.len() as u64));

    group.bench_function("capped_at_5000", |b| {
        b.iter(|| {
            let mut trend = TrendBuffer::new(Some(5000));
            black_box(trend.extend(data.iter().copied()))
        })
    });

    group.bench_function("plot_points", |b| {
        let mut trend = TrendBuffer::new(None);
        trend.extend(data.iter().copied());
        b.iter(|| black_box(trend.points()))
    });

    group.finish();
}

fn bench_build_report(c: &mut Criterion) {
    let rows: Vec<DurableRow> = samples(10_000)
        .iter()
        .enumerate()
        .map(|(i, s)| DurableRow {
            index: i as u64 + 1,
            elapsed: s.elapsed,
            value: s.value,
            wallclock: "12:00:00.000".to_string(),
        })
        .collect();
    let metadata = ReportMetadata::default();
    let options = ReportOptions::default();

    c.bench_function("build_report_10k", |b| {
        b.iter(|| black_box(build_report(black_box(&rows), &options, &metadata)))
    });
}

criterion_group!(
    benches,
    bench_view_bounds,
    bench_statistics,
    bench_trend_fill,
    bench_build_report,
);

criterion_main!(benches);
