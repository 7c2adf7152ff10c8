//! Append benchmarks for pmwal
//!
//! - Single-threaded append with the cleanup thread draining into memory
//! - Concurrent appends from a rayon pool
//! - Appends applied to a real file target

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rayon::prelude::*;

use pmwal::log::{CleanupWorker, DurableLog, LogConfig};
use pmwal::target::{FileTarget, MemTarget, TargetId, TargetTable};

const PAYLOAD: &[u8] = b"hello";
const TARGET_SPAN: u64 = 5120;

// =============================================================================
// Helper Functions
// =============================================================================

/// Create an in-memory log with a running cleanup thread
fn create_log(capacity: usize) -> (Arc<DurableLog>, CleanupWorker, TargetId) {
    let mut targets = TargetTable::new();
    let out = targets.register(MemTarget::with_size(TARGET_SPAN as usize));
    let (log, _) = DurableLog::open(LogConfig::anonymous().with_capacity(capacity), targets)
        .expect("open log");
    let log = Arc::new(log);
    let worker = log.start_cleanup().expect("start cleanup");
    (log, worker, out)
}

/// Create a file-backed log applying to a file target
fn create_file_log(
    dir: &std::path::Path,
    capacity: usize,
) -> (Arc<DurableLog>, CleanupWorker, TargetId) {
    let mut targets = TargetTable::new();
    let out = targets.register(FileTarget::open(dir.join("out.dat"), true).expect("open target"));
    let config = LogConfig::new(dir.join("nvmm.dat")).with_capacity(capacity);
    let (log, _) = DurableLog::open(config, targets).expect("open log");
    let log = Arc::new(log);
    let worker = log.start_cleanup().expect("start cleanup");
    (log, worker, out)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(5));

    for capacity in [64usize, 4096, 65536] {
        let (log, worker, out) = create_log(capacity);
        let mut i = 0u64;
        group.bench_with_input(BenchmarkId::new("capacity", capacity), &capacity, |b, _| {
            b.iter(|| {
                let offset = (i * PAYLOAD.len() as u64) % TARGET_SPAN;
                i += 1;
                log.append(out, black_box(PAYLOAD), offset).expect("append")
            })
        });
        worker.stop().expect("stop cleanup");
    }

    group.finish();
}

fn bench_concurrent_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_append");
    group.measurement_time(Duration::from_secs(10));

    for num_threads in [1, 2, 4, 8] {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .unwrap();
        let (log, worker, out) = create_log(65536);

        let ops_per_thread = 10000u64;
        group.throughput(Throughput::Elements(ops_per_thread * num_threads as u64));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let total_ops = AtomicU64::new(0);
                    pool.install(|| {
                        (0..num_threads).into_par_iter().for_each(|t| {
                            for i in 0..ops_per_thread {
                                let offset = ((t as u64 * ops_per_thread + i)
                                    * PAYLOAD.len() as u64)
                                    % TARGET_SPAN;
                                log.append(out, black_box(PAYLOAD), offset).unwrap();
                            }
                            total_ops.fetch_add(ops_per_thread, Ordering::Relaxed);
                        });
                    });
                    total_ops.load(Ordering::Relaxed)
                })
            },
        );
        worker.stop().unwrap();
    }

    group.finish();
}

fn bench_file_target(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_target");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    let dir = tempfile::tempdir().unwrap();
    let (log, worker, out) = create_file_log(dir.path(), 65536);
    let mut i = 0u64;
    group.bench_function("append", |b| {
        b.iter(|| {
            let offset = (i * PAYLOAD.len() as u64) % TARGET_SPAN;
            i += 1;
            log.append(out, black_box(PAYLOAD), offset).unwrap()
        })
    });
    worker.stop().unwrap();

    group.finish();
}

criterion_group!(
    name = append_benches;
    config = Criterion::default().sample_size(100);
    targets = bench_append, bench_concurrent_append
);

criterion_group!(
    name = disk_benches;
    config = Criterion::default()
        .sample_size(30)
        .measurement_time(Duration::from_secs(10));
    targets = bench_file_target
);

criterion_main!(append_benches, disk_benches);
