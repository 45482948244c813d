//! Record store and request handling benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docsync_bench::scene;
use docsync_protocol::{
    document_path, ApiRequest, CreateRequest, Method, SaveRequest, UserId,
};
use docsync_server::{DocumentServer, RecordStore, ServerConfig};

/// Benchmark accepted compare-and-set writes.
fn bench_accepted_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_accepted");

    for elements in [1, 64, 512].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(elements),
            elements,
            |b, &elements| {
                let store = RecordStore::new();
                let record = store.create(&UserId::new("bench"), CreateRequest::default());
                let content = scene(elements);
                let mut version = record.version;

                b.iter(|| {
                    let written = store
                        .write(&record.id, version, black_box(content.clone()), None)
                        .unwrap();
                    version = written.version;
                });
            },
        );
    }
    group.finish();
}

/// Benchmark stale writes that are rejected.
fn bench_rejected_write(c: &mut Criterion) {
    let store = RecordStore::new();
    let record = store.create(&UserId::new("bench"), CreateRequest::default());
    let content = scene(64);

    c.bench_function("write_rejected", |b| {
        b.iter(|| {
            let result = store.write(&record.id, 0, black_box(content.clone()), None);
            black_box(result.is_err());
        });
    });
}

/// Benchmark a full save round trip through the request handler.
fn bench_handle_save(c: &mut Criterion) {
    let server = DocumentServer::new(ServerConfig::default());
    let record = server
        .store()
        .create(&UserId::new("bench"), CreateRequest::default());
    let content = scene(64);
    let path = document_path(&record.id);
    let mut version = record.version;

    c.bench_function("handle_save", |b| {
        b.iter(|| {
            let request = ApiRequest::new(Method::Put, path.clone())
                .with_credentials("bench")
                .with_json(&SaveRequest::new(version, content.clone()))
                .unwrap();
            let response = server.handle(black_box(&request));
            assert!(response.is_success());
            version += 1;
        });
    });
}

criterion_group!(
    benches,
    bench_accepted_write,
    bench_rejected_write,
    bench_handle_save
);
criterion_main!(benches);
