//! Benchmark for the shared-configuration hot paths

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ipcap::acquisition::parse_server_list;
use ipcap::acquisition::AcquisitionConfig;

fn bench_claim_next_server(c: &mut Criterion) {
    let config = AcquisitionConfig::new(
        (0..16).map(|i| format!("capture-{i}")).collect(),
        Some(100),
    )
    .unwrap();

    c.bench_function("claim_next_server", |b| {
        b.iter(|| black_box(config.claim_next_server()));
    });
}

fn bench_acquire_release(c: &mut Criterion) {
    let config = AcquisitionConfig::new(vec!["capture-0".to_string()], Some(100)).unwrap();

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let handle = config.acquire();
            black_box(&handle);
        });
    });
}

fn bench_parse_server_list(c: &mut Criterion) {
    let raw = (0..32)
        .map(|i| format!("capture-{i}"))
        .collect::<Vec<_>>()
        .join(",");

    c.bench_function("parse_server_list", |b| {
        b.iter(|| parse_server_list(black_box(&raw)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_claim_next_server,
    bench_acquire_release,
    bench_parse_server_list
);
criterion_main!(benches);
