// benches/vfs_bench.rs
//! Registry and pipe throughput

use bytes::{Buf, Bytes};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sandbox_bridge::vfs::{pipe, FilesystemRegistry, TaskId, VirtualFile};
use std::io::{self, Read, Write};
use std::thread;

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("register_1000", |b| {
        let ids: Vec<TaskId> = (0..1000).map(|_| TaskId::generate()).collect();
        b.iter(|| {
            let registry = FilesystemRegistry::new();
            for id in &ids {
                registry
                    .register(
                        id.clone(),
                        VirtualFile::reader("in", io::empty()),
                        VirtualFile::writer("out", io::sink()),
                    )
                    .unwrap();
            }
            black_box(registry.len())
        })
    });

    let registry = FilesystemRegistry::new();
    let ids: Vec<TaskId> = (0..1000).map(|_| TaskId::generate()).collect();
    for id in &ids {
        registry
            .register(
                id.clone(),
                VirtualFile::reader("in", io::empty()),
                VirtualFile::writer("out", io::sink()),
            )
            .unwrap();
    }
    let paths: Vec<String> = ids.iter().map(|id| format!("in/{}", id)).collect();

    group.bench_function("open_1000", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(registry.open(path).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_pipe(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipe");
    let payload = Bytes::from(vec![7u8; 1024 * 1024]);
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for capacity in [0usize, 1, 16] {
        group.bench_with_input(BenchmarkId::new("stream_1mb", capacity), &capacity, |b, &capacity| {
            b.iter(|| {
                let (mut writer, mut reader) = pipe(capacity);
                let mut source = payload.clone().reader();
                let producer = thread::spawn(move || {
                    io::copy(&mut source, &mut writer).unwrap();
                    writer.close();
                });

                let mut sink = Vec::with_capacity(1024 * 1024);
                reader.read_to_end(&mut sink).unwrap();
                producer.join().unwrap();
                black_box(sink.len())
            })
        });
    }

    group.finish();
}

fn bench_virtual_file(c: &mut Criterion) {
    c.bench_function("virtual_file_write_4k", |b| {
        let chunk = [1u8; 4096];
        b.iter(|| {
            let file = VirtualFile::writer("out", io::sink());
            for _ in 0..64 {
                (&file).write_all(&chunk).unwrap();
            }
            file.close().unwrap();
        })
    });
}

criterion_group!(benches, bench_registry, bench_pipe, bench_virtual_file);
criterion_main!(benches);
