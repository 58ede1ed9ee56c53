//! Blocking task queue executor for long-running internal work.

use super::job::Job;
use super::strategy::{ProcessingStrategy, StrategyError};
use super::thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolStats, WaitMode};

const TASK_QUEUE_STRATEGY: &str = "task-queue";

/// A [`ThreadPool`] whose idle workers suspend on the queue instead of
/// polling. Workers wake when a job is added or the executor stops.
///
/// The default instance runs a single worker, so queued tasks (pre-tiling,
/// raw conversion) execute one after another.
#[derive(Debug)]
pub struct TaskQueueExecutor {
    pool: ThreadPool,
}

impl TaskQueueExecutor {
    pub fn new(num_threads: usize) -> Self {
        Self::with_config(ThreadPoolConfig::blocking(num_threads))
    }

    /// Any wait mode in `config` is overridden with [`WaitMode::Block`].
    pub fn with_config(mut config: ThreadPoolConfig) -> Self {
        config.wait_mode = WaitMode::Block;
        Self {
            pool: ThreadPool::named(TASK_QUEUE_STRATEGY, config),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    pub fn live_workers(&self) -> usize {
        self.pool.live_workers()
    }

    pub fn stats(&self) -> ThreadPoolStats {
        self.pool.stats()
    }
}

impl Default for TaskQueueExecutor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ProcessingStrategy for TaskQueueExecutor {
    fn name(&self) -> &'static str {
        TASK_QUEUE_STRATEGY
    }

    fn init(&self) -> Result<(), StrategyError> {
        self.pool.init()
    }

    fn process(&self, job: Job) -> Result<(), StrategyError> {
        self.pool.process(job)
    }

    fn stop(&self) {
        self.pool.stop()
    }

    fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    fn add_task(&self, job: Job) -> Result<(), StrategyError> {
        self.pool.add_task(job)
    }

    fn remove_task(&self) -> Option<Job> {
        self.pool.remove_task()
    }

    fn has_no_tasks_queued(&self) -> bool {
        self.pool.has_no_tasks_queued()
    }
}
