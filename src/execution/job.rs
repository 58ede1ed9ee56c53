//! Units of work carried by processing strategies.
//!
//! A [`Job`] is an owned value: it is moved into a strategy on submit, moved
//! out of a queue by exactly one worker, and consumed when it runs. Every job
//! reports its outcome at most once through its optional reporter, including
//! jobs that are dropped without running ([`JobOutcome::Discarded`]).

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::oneshot;

use super::module::LoadedModule;
use super::queue::JobQueue;
use super::strategy::StrategyError;

/// Process-wide job sequence.
static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Closure body of a job.
pub type JobFn = Box<dyn FnOnce(&JobContext<'_>) -> Result<(), JobError> + Send + 'static>;

type Reporter = Box<dyn FnOnce(JobOutcome) + Send + 'static>;

/// Errors raised by a job body. These never escape the worker that ran the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Job cannot run under the {0} strategy")]
    Unsupported(&'static str),

    #[error("Job has no body")]
    Empty,
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Final outcome of a job, delivered through its reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Panicked(String),
    /// Dropped before it ran, e.g. still queued when its pool stopped.
    Discarded,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
            Self::Discarded => "discarded",
        }
    }
}

/// What a job does when it runs.
pub enum JobBody {
    /// Arbitrary work, given the context of the strategy running it.
    Closure(JobFn),
    /// Call an exported function of the module loaded by a
    /// [`DynamicModuleExecutor`](super::DynamicModuleExecutor). An empty
    /// symbol selects the executor's default entry point.
    ModuleCall { symbol: String, argument: String },
}

/// A uniquely owned unit of work.
pub struct Job {
    id: u64,
    label: String,
    body: Option<JobBody>,
    reporter: Option<Reporter>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            Some(JobBody::Closure(_)) => "closure",
            Some(JobBody::ModuleCall { .. }) => "module_call",
            None => "empty",
        };
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &kind)
            .field("reports", &self.reporter.is_some())
            .finish()
    }
}

impl Job {
    /// Create a closure job.
    pub fn new<F>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&JobContext<'_>) -> Result<(), JobError> + Send + 'static,
    {
        Self::from_body(label.into(), JobBody::Closure(Box::new(body)))
    }

    /// Create a job that calls `symbol` in a dynamically loaded module.
    pub fn module_call(symbol: impl Into<String>, argument: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let label = format!("module:{}", symbol);
        Self::from_body(
            label,
            JobBody::ModuleCall {
                symbol,
                argument: argument.into(),
            },
        )
    }

    fn from_body(label: String, body: JobBody) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            label,
            body: Some(body),
            reporter: None,
        }
    }

    /// Attach a callback invoked exactly once with the job's outcome.
    ///
    /// Replaces any reporter set earlier; use [`Job::with_handle`] after this
    /// to also obtain a handle.
    pub fn with_reporter<F>(mut self, reporter: F) -> Self
    where
        F: FnOnce(JobOutcome) + Send + 'static,
    {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Attach a completion channel and return its receiving handle.
    pub fn with_handle(mut self) -> (Self, JobHandle) {
        let (tx, rx) = oneshot::channel();
        let previous = self.reporter.take();
        self.reporter = Some(Box::new(move |outcome: JobOutcome| {
            if let Some(previous) = previous {
                let reported = outcome.clone();
                let result = panic::catch_unwind(AssertUnwindSafe(|| previous(reported)));
                let _ = tx.send(outcome);
                if let Err(payload) = result {
                    panic::resume_unwind(payload);
                }
                return;
            }
            let _ = tx.send(outcome);
        }));
        let handle = JobHandle { id: self.id, rx };
        (self, handle)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_module_call(&self) -> bool {
        matches!(self.body, Some(JobBody::ModuleCall { .. }))
    }

    /// Take the symbol and argument out of a module call job.
    pub(crate) fn take_module_call(&mut self) -> Option<(String, String)> {
        if !self.is_module_call() {
            return None;
        }
        match self.body.take() {
            Some(JobBody::ModuleCall { symbol, argument }) => Some((symbol, argument)),
            _ => None,
        }
    }

    /// Run the body on the current thread, catching panics, and report.
    pub(crate) fn run(mut self, ctx: &JobContext<'_>) -> JobOutcome {
        let outcome = match self.body.take() {
            Some(JobBody::Closure(body)) => {
                match panic::catch_unwind(AssertUnwindSafe(|| body(ctx))) {
                    Ok(Ok(())) => JobOutcome::Completed,
                    Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
                    Err(payload) => JobOutcome::Panicked(panic_message(payload.as_ref())),
                }
            }
            Some(JobBody::ModuleCall { .. }) => {
                JobOutcome::Failed(JobError::Unsupported(ctx.strategy_name()).to_string())
            }
            None => JobOutcome::Failed(JobError::Empty.to_string()),
        };
        self.finish(outcome.clone());
        outcome
    }

    /// Report `outcome` without running the body.
    pub(crate) fn finish(mut self, outcome: JobOutcome) {
        self.report(outcome);
    }

    /// Hand `outcome` to the reporter. A panicking reporter is logged and
    /// swallowed so it can never take the calling worker down.
    fn report(&mut self, outcome: JobOutcome) {
        let Some(reporter) = self.reporter.take() else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| reporter(outcome))) {
            tracing::error!(
                job_id = self.id,
                label = %self.label,
                panic = %panic_message(payload.as_ref()),
                "job completion reporter panicked"
            );
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.report(JobOutcome::Discarded);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Receiving side of a job's completion channel.
#[derive(Debug)]
pub struct JobHandle {
    id: u64,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the job reports.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`JobHandle::outcome`] there.
    pub fn wait(self) -> JobOutcome {
        self.rx.blocking_recv().unwrap_or(JobOutcome::Discarded)
    }

    /// Await the job's outcome.
    pub async fn outcome(self) -> JobOutcome {
        self.rx.await.unwrap_or(JobOutcome::Discarded)
    }

    /// Non-blocking check. `None` while the job is still pending.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(JobOutcome::Discarded),
        }
    }
}

/// View of the strategy a job is running under.
pub struct JobContext<'a> {
    strategy: &'static str,
    worker: Option<usize>,
    queue: Option<&'a JobQueue>,
    module: Option<&'a dyn LoadedModule>,
}

impl<'a> JobContext<'a> {
    pub(crate) fn inline(strategy: &'static str) -> Self {
        Self {
            strategy,
            worker: None,
            queue: None,
            module: None,
        }
    }

    pub(crate) fn for_worker(strategy: &'static str, worker: usize, queue: &'a JobQueue) -> Self {
        Self {
            strategy,
            worker: Some(worker),
            queue: Some(queue),
            module: None,
        }
    }

    pub(crate) fn for_module(strategy: &'static str, module: &'a dyn LoadedModule) -> Self {
        Self {
            strategy,
            worker: None,
            queue: None,
            module: Some(module),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy
    }

    /// Index of the pool worker running this job, if any.
    pub fn worker_index(&self) -> Option<usize> {
        self.worker
    }

    /// Push a follow-up job onto the queue this job came from.
    pub fn requeue(&self, job: Job) -> Result<(), StrategyError> {
        match self.queue {
            Some(queue) => queue.push(job),
            None => Err(StrategyError::Unsupported {
                strategy: self.strategy,
                operation: "requeue",
            }),
        }
    }

    /// Jobs waiting in the originating queue (0 for queueless strategies).
    pub fn queued_jobs(&self) -> usize {
        self.queue.map_or(0, JobQueue::len)
    }

    /// The loaded module, when running under the dynamic module strategy.
    pub fn module(&self) -> Option<&'a dyn LoadedModule> {
        self.module
    }
}
