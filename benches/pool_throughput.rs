//! Pool throughput benchmarks.
//!
//! Measures submit-to-completion throughput of the polling thread pool and the
//! blocking task queue, against inline sequential execution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tissue_exec::execution::{
    Job, ProcessingStrategy, SequentialExecutor, TaskQueueExecutor, ThreadPool,
};

const JOBS_PER_ITER: u64 = 256;

fn small_job(sink: &Arc<AtomicU64>, i: u64) -> Job {
    let sink = sink.clone();
    Job::new("bench", move |_| {
        // Stand-in for a cheap tile lookup.
        let mut acc = i;
        for k in 0..64 {
            acc = acc.wrapping_mul(6364136223846793005).wrapping_add(k);
        }
        sink.fetch_add(black_box(acc) & 1, Ordering::Relaxed);
        Ok(())
    })
}

/// Submit a batch and wait for every handle.
fn run_batch(strategy: &dyn ProcessingStrategy, sink: &Arc<AtomicU64>) {
    let handles: Vec<_> = (0..JOBS_PER_ITER)
        .map(|i| {
            let (job, handle) = small_job(sink, i).with_handle();
            strategy.process(job).expect("submit");
            handle
        })
        .collect();
    for handle in handles {
        black_box(handle.wait());
    }
}

fn bench_pools(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_throughput");
    group.throughput(Throughput::Elements(JOBS_PER_ITER));
    let sink = Arc::new(AtomicU64::new(0));

    for threads in [1usize, 2, 4] {
        let pool = ThreadPool::new(threads);
        pool.init().expect("init pool");
        group.bench_function(BenchmarkId::new("thread_pool", threads), |b| {
            b.iter(|| run_batch(&pool, &sink))
        });
        pool.stop();

        let queue = TaskQueueExecutor::new(threads);
        queue.init().expect("init queue");
        group.bench_function(BenchmarkId::new("task_queue", threads), |b| {
            b.iter(|| run_batch(&queue, &sink))
        });
        queue.stop();
    }

    let sequential = SequentialExecutor::new();
    sequential.init().expect("init sequential");
    group.bench_function("sequential", |b| b.iter(|| run_batch(&sequential, &sink)));

    group.finish();
}

criterion_group!(benches, bench_pools);
criterion_main!(benches);
