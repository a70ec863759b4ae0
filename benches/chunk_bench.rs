//! Benchmarks for chunksaver.
//!
//! Run with:
//!     cargo bench

use std::sync::Arc;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use chunksaver::{ChunkSplitter, Envelope, IoSink, MemoryStorage, MimePart};

/// Streams `data` through a fresh splitter in `write_size` pieces.
fn run_message(storage: &Arc<MemoryStorage>, data: &[u8], cap: usize, write_size: usize) -> u64 {
    let mut splitter = ChunkSplitter::new(IoSink::new(std::io::sink()), storage.clone(), cap);
    let envelope = Envelope::new("sender@example.com", "rcpt@example.com").into_shared();
    envelope
        .write()
        .set_mime_parts(vec![MimePart::new("1", 0, 512)]);

    splitter.open(envelope).unwrap();
    for piece in data.chunks(write_size) {
        splitter.write(piece).unwrap();
    }
    let written = splitter.written();
    splitter.close().unwrap();
    written
}

fn bench_splitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("splitter");

    for size in [64 * 1024, 1024 * 1024, 10 * 1024 * 1024] {
        // Deterministic pseudo-random data
        let data: Vec<u8> = (0..size).map(|i| (i * 7 + 13) as u8).collect();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(format!("unique_{}kb", size / 1024), &data, |b, data| {
            b.iter(|| {
                let storage = Arc::new(MemoryStorage::new());
                black_box(run_message(&storage, black_box(data), 16 * 1024, 4096))
            });
        });

        // Same message every iteration, so every chunk after the first run dedups
        let storage = Arc::new(MemoryStorage::new());
        group.bench_with_input(format!("dedup_{}kb", size / 1024), &data, |b, data| {
            b.iter(|| black_box(run_message(&storage, black_box(data), 16 * 1024, 4096)));
        });
    }

    group.finish();
}

fn bench_configs(c: &mut Criterion) {
    let mut group = c.benchmark_group("configs");
    let size = 1024 * 1024; // 1 MB
    let data: Vec<u8> = (0..size).map(|i| (i * 7 + 13) as u8).collect();
    group.throughput(Throughput::Bytes(size as u64));

    for cap in [4 * 1024, 16 * 1024, 64 * 1024] {
        group.bench_function(format!("cap_{}kb", cap / 1024), |b| {
            b.iter(|| {
                let storage = Arc::new(MemoryStorage::new());
                black_box(run_message(&storage, &data, cap, 4096))
            });
        });
    }

    // Compressed memory engine
    group.bench_function("compress_level_6", |b| {
        b.iter(|| {
            let storage = Arc::new(MemoryStorage::with_compress_level(6));
            black_box(run_message(&storage, &data, 16 * 1024, 4096))
        });
    });

    // Tiny writes, as a line-oriented DATA reader would produce
    group.bench_function("line_writes", |b| {
        b.iter(|| {
            let storage = Arc::new(MemoryStorage::new());
            black_box(run_message(&storage, &data, 16 * 1024, 78))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_splitter, bench_configs);
criterion_main!(benches);
