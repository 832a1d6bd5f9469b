//! Content hasher throughput benchmark
//!
//! Measures streaming etag computation over temp files of a few sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kappa_pan::upload::hasher::file_etag;
use rand::RngCore;
use std::io::{Seek, SeekFrom, Write};
use tokio::runtime::Runtime;

fn bench_file_etag(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hasher");

    for size_mib in [1usize, 16] {
        let bytes = size_mib * 1024 * 1024;
        let mut payload = vec![0u8; bytes];
        rand::rng().fill_bytes(&mut payload);
        let mut std_file = tempfile::tempfile().unwrap();
        std_file.write_all(&payload).unwrap();
        std_file.seek(SeekFrom::Start(0)).unwrap();

        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(
            BenchmarkId::new("file_etag", format!("{size_mib}MiB")),
            &std_file,
            |b, std_file| {
                b.iter(|| {
                    rt.block_on(async {
                        // The clone shares the cursor; file_etag rewinds it
                        // on completion, keeping iterations uniform.
                        let mut file = tokio::fs::File::from_std(std_file.try_clone().unwrap());
                        file_etag(&mut file).await.unwrap()
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_file_etag);
criterion_main!(benches);
