use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use log_shipper::domain::Destination;
use log_shipper::parser::{RecordNormalizer, RowTime, TabularHeader, parse_timestamp};
use std::hint::black_box;

fn benchmark_line_normalizers(c: &mut Criterion) {
    let normalizer = RecordNormalizer::new();
    let destination = Destination::new("cpuinfolog").unwrap();
    let key_value = "Timestamp=1700000000,cpu=12.5,mem=55,disk=80,load=0.42,host=node-a";
    let bracketed = "[02-09-23:44:24:837] dispatcher heartbeat: 12 jobs queued, 3 running";

    let mut group = c.benchmark_group("line_normalizers");
    group.throughput(Throughput::Bytes(key_value.len() as u64));
    group.bench_function("key_value", |b| {
        b.iter(|| normalizer.key_value(black_box(key_value), &destination));
    });

    group.throughput(Throughput::Bytes(bracketed.len() as u64));
    group.bench_function("bracketed", |b| {
        b.iter(|| normalizer.bracketed(black_box(bracketed), &destination));
    });
    group.finish();
}

fn benchmark_tabular_rows(c: &mut Criterion) {
    let header = TabularHeader::new(["Time", "Scenario Name", "1stRun-ID", "Result", "Duration (ms)"]);
    let destination = Destination::new("mlscenariocsv").unwrap();
    let row = ["2025-01-21 13:24:44", "cold boot", "run 7", " pass ", "1 204"];

    c.bench_function("tabular_row", |b| {
        b.iter(|| header.normalize_row(black_box(row), &destination, RowTime::Column));
    });
}

fn benchmark_timestamp_formats(c: &mut Criterion) {
    let samples = [
        ("full", "2025-01-21 13:24:44"),
        ("compact", "20250121-132444"),
        ("yearless", "02-09-23:44:24:837"),
        ("fallback", "not-a-date"),
    ];

    let mut group = c.benchmark_group("timestamp");
    for (name, raw) in samples {
        group.bench_function(name, |b| b.iter(|| parse_timestamp(black_box(raw))));
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_line_normalizers,
    benchmark_tabular_rows,
    benchmark_timestamp_formats
);
criterion_main!(benches);
