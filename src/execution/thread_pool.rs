//! Fixed-size worker pool over a shared FIFO job queue.
//!
//! One pool type serves both the polling [`ThreadPool`] and the blocking
//! [`TaskQueueExecutor`](super::TaskQueueExecutor): idle workers either sleep
//! for a poll interval or wait on the queue's condition variable, selected by
//! [`WaitMode`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::job::{Job, JobContext, JobOutcome};
use super::queue::JobQueue;
use super::strategy::{Lifecycle, ProcessingStrategy, StrategyError};
use super::worker::{WorkerState, WorkerThread};
use crate::telemetry::{JobSpan, SpanExt};

const POOL_STRATEGY: &str = "thread-pool";

/// How idle workers wait for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Release the lock and sleep for the interval, then look again.
    Poll(Duration),
    /// Suspend until a job arrives or the pool stops.
    Block,
}

/// What happens to jobs still queued when a pool stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Drop them unexecuted; each reports [`JobOutcome::Discarded`].
    #[default]
    DropQueued,
    /// Workers keep consuming until the queue is empty, then exit.
    Drain,
}

impl ShutdownPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropQueued => "drop",
            Self::Drain => "drain",
        }
    }

    /// Parse `drop` or `drain` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop" => Some(Self::DropQueued),
            "drain" => Some(Self::Drain),
            _ => None,
        }
    }
}

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (0 = auto-detect).
    pub num_threads: usize,
    /// Thread name prefix; workers are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
    /// Thread stack size in bytes (0 = default).
    pub stack_size: usize,
    pub wait_mode: WaitMode,
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0, // Auto-detect
            thread_name_prefix: "ts-worker".to_string(),
            stack_size: 0,
            wait_mode: WaitMode::Poll(Duration::from_millis(10)),
            shutdown_policy: ShutdownPolicy::DropQueued,
        }
    }
}

impl ThreadPoolConfig {
    /// Polling pool with a specific thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Default::default()
        }
    }

    /// Blocking pool, as used by the task queue executor.
    pub fn blocking(num_threads: usize) -> Self {
        Self {
            num_threads,
            thread_name_prefix: "ts-task".to_string(),
            wait_mode: WaitMode::Block,
            ..Default::default()
        }
    }

    /// Thread count with auto-detection applied.
    pub fn resolved_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_threads
        }
    }
}

/// Statistics for pool activity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThreadPoolStats {
    pub jobs_executed: u64,
    pub jobs_failed: u64,
    pub jobs_panicked: u64,
    pub jobs_discarded: u64,
    pub avg_exec_time_us: u64,
    pub threads_active: usize,
    pub threads_idle: usize,
}

#[derive(Default)]
struct PoolCounters {
    executed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    discarded: AtomicU64,
    avg_exec_us: AtomicU64,
    active: AtomicUsize,
}

impl PoolCounters {
    fn record(&self, outcome: &JobOutcome, elapsed: Duration) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            JobOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::Panicked(_) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::Completed | JobOutcome::Discarded => {}
        }
        // Rolling average of execution time
        let exec_us = elapsed.as_micros() as u64;
        let _ = self
            .avg_exec_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |avg| {
                Some(if avg == 0 { exec_us } else { (avg * 9 + exec_us) / 10 })
            });
    }
}

struct PoolShared {
    queue: JobQueue,
    counters: PoolCounters,
}

/// Fixed-size pool of [`WorkerThread`]s pulling from one FIFO queue.
///
/// Jobs leave the queue in submission order; completion order across workers
/// is unspecified. The worker count is fixed at construction.
pub struct ThreadPool {
    name: &'static str,
    config: ThreadPoolConfig,
    num_threads: usize,
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<WorkerThread>>,
    lifecycle: Mutex<Lifecycle>,
}

impl ThreadPool {
    /// Polling pool with `num_threads` workers (0 = one per CPU).
    pub fn new(num_threads: usize) -> Self {
        Self::with_config(ThreadPoolConfig::with_threads(num_threads))
    }

    pub fn with_config(config: ThreadPoolConfig) -> Self {
        Self::named(POOL_STRATEGY, config)
    }

    pub(crate) fn named(name: &'static str, config: ThreadPoolConfig) -> Self {
        let num_threads = config.resolved_threads();
        Self {
            name,
            num_threads,
            shared: Arc::new(PoolShared {
                queue: JobQueue::new(name),
                counters: PoolCounters::default(),
            }),
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            lifecycle: Mutex::new(Lifecycle::Created),
            config,
        }
    }

    /// Get number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Workers currently spawned and not yet told to stop.
    pub fn live_workers(&self) -> usize {
        self.workers.lock().iter().filter(|w| w.is_running()).count()
    }

    /// Get current statistics.
    pub fn stats(&self) -> ThreadPoolStats {
        let counters = &self.shared.counters;
        let threads_active = counters.active.load(Ordering::Relaxed);
        ThreadPoolStats {
            jobs_executed: counters.executed.load(Ordering::Relaxed),
            jobs_failed: counters.failed.load(Ordering::Relaxed),
            jobs_panicked: counters.panicked.load(Ordering::Relaxed),
            jobs_discarded: counters.discarded.load(Ordering::Relaxed),
            avg_exec_time_us: counters.avg_exec_us.load(Ordering::Relaxed),
            threads_active,
            threads_idle: self.live_workers().saturating_sub(threads_active),
        }
    }

    fn spawn_workers(&self, workers: &mut Vec<WorkerThread>) -> Result<(), StrategyError> {
        for index in 0..self.num_threads {
            let shared = Arc::clone(&self.shared);
            let name = self.name;
            let mode = self.config.wait_mode;
            let policy = self.config.shutdown_policy;
            let thread_name = format!("{}-{}", self.config.thread_name_prefix, index);

            let worker = WorkerThread::spawn(index, thread_name, self.config.stack_size, move |state| {
                worker_loop(name, state, &shared, mode, policy);
            })
            .map_err(|e| StrategyError::ThreadSpawnFailed(e.to_string()))?;
            workers.push(worker);
        }
        Ok(())
    }
}

/// Worker thread main loop.
fn worker_loop(
    strategy: &'static str,
    worker: &WorkerState,
    shared: &PoolShared,
    mode: WaitMode,
    policy: ShutdownPolicy,
) {
    tracing::debug!(strategy, worker = worker.index(), "worker started");

    while let Some(job) = shared.queue.next_job(worker, mode, policy) {
        let span = JobSpan::new(job.id(), strategy);
        let ctx = JobContext::for_worker(strategy, worker.index(), &shared.queue);

        shared.counters.active.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let outcome = span.in_scope(|| job.run(&ctx));
        let elapsed = start.elapsed();
        shared.counters.active.fetch_sub(1, Ordering::Relaxed);

        span.record_outcome(&outcome, elapsed);
        shared.counters.record(&outcome, elapsed);
    }

    tracing::debug!(strategy, worker = worker.index(), "worker exiting");
}

impl ProcessingStrategy for ThreadPool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&self) -> Result<(), StrategyError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => {
                return Err(StrategyError::AlreadyInitialized { strategy: self.name })
            }
            Lifecycle::Stopped => return Err(StrategyError::NotInitialized { strategy: self.name }),
            Lifecycle::Created => {}
        }

        let mut workers = self.workers.lock();
        if let Err(e) = self.spawn_workers(&mut workers) {
            // Roll back the partial pool so init can be retried.
            for worker in workers.iter() {
                worker.stop();
            }
            self.shared.queue.wake_all();
            for mut worker in workers.drain(..) {
                worker.join();
            }
            tracing::error!(strategy = self.name, error = %e, "pool init failed");
            return Err(e);
        }

        *lifecycle = Lifecycle::Running;
        tracing::info!(
            strategy = self.name,
            threads = self.num_threads,
            policy = self.config.shutdown_policy.as_str(),
            "pool started"
        );
        Ok(())
    }

    fn process(&self, job: Job) -> Result<(), StrategyError> {
        if *self.lifecycle.lock() != Lifecycle::Running {
            return Err(StrategyError::NotInitialized { strategy: self.name });
        }
        self.add_task(job)
    }

    fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
        }

        let mut workers = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.stop();
        }
        self.shared.queue.close();
        for worker in workers.iter_mut() {
            worker.join();
        }

        let leftover = self.shared.queue.drain();
        let discarded = leftover.len();
        self.shared
            .counters
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        drop(leftover);

        tracing::info!(strategy = self.name, discarded, "pool stopped");
    }

    fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// Jobs may be staged before `init`; workers pick them up once started.
    fn add_task(&self, job: Job) -> Result<(), StrategyError> {
        if job.is_module_call() {
            return Err(StrategyError::Unsupported {
                strategy: self.name,
                operation: "module call",
            });
        }
        self.shared.queue.push(job)
    }

    fn remove_task(&self) -> Option<Job> {
        self.shared.queue.pop()
    }

    fn has_no_tasks_queued(&self) -> bool {
        self.shared.queue.is_empty()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.name)
            .field("num_threads", &self.num_threads)
            .field("lifecycle", &*self.lifecycle.lock())
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}
