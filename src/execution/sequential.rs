//! Synchronous execution on the caller's thread.

use parking_lot::{Mutex, ReentrantMutex};

use super::job::{Job, JobContext, JobOutcome};
use super::strategy::{Lifecycle, ProcessingStrategy, StrategyError};

const SEQUENTIAL_STRATEGY: &str = "sequential";

/// Runs each job to completion before `process` returns.
///
/// Concurrent callers are serialized, so no two jobs ever overlap. A job may
/// submit further work to the same executor from inside its body.
#[derive(Debug)]
pub struct SequentialExecutor {
    lifecycle: Mutex<Lifecycle>,
    gate: ReentrantMutex<()>,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle::Created),
            gate: ReentrantMutex::new(()),
        }
    }

    /// Like [`process`](ProcessingStrategy::process) but also returns the
    /// job's outcome.
    pub fn run(&self, job: Job) -> Result<JobOutcome, StrategyError> {
        if *self.lifecycle.lock() != Lifecycle::Running {
            return Err(StrategyError::NotInitialized {
                strategy: SEQUENTIAL_STRATEGY,
            });
        }
        if job.is_module_call() {
            return Err(StrategyError::Unsupported {
                strategy: SEQUENTIAL_STRATEGY,
                operation: "module call",
            });
        }

        let _gate = self.gate.lock();
        let job_id = job.id();
        let outcome = job.run(&JobContext::inline(SEQUENTIAL_STRATEGY));
        if !outcome.is_success() {
            tracing::warn!(job_id, outcome = outcome.as_str(), "sequential job did not complete");
        }
        Ok(outcome)
    }
}

impl Default for SequentialExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStrategy for SequentialExecutor {
    fn name(&self) -> &'static str {
        SEQUENTIAL_STRATEGY
    }

    fn init(&self) -> Result<(), StrategyError> {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Running {
            return Err(StrategyError::AlreadyInitialized {
                strategy: SEQUENTIAL_STRATEGY,
            });
        }
        *lifecycle = Lifecycle::Running;
        Ok(())
    }

    fn process(&self, job: Job) -> Result<(), StrategyError> {
        self.run(job).map(|_| ())
    }

    /// Nothing to release.
    fn stop(&self) {}

    fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }
}
