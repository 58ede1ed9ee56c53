//! The processing strategy contract shared by every executor.

use thiserror::Error;

use super::job::Job;
use super::module::ModuleError;

/// An execution policy: how a submitted [`Job`] gets run.
///
/// Strategies are shared behind `Arc` and driven through `&self`, so every
/// implementation keeps its lifecycle state behind interior mutability.
pub trait ProcessingStrategy: Send + Sync {
    /// Short, stable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Prepare execution resources. Must succeed before [`process`](Self::process).
    fn init(&self) -> Result<(), StrategyError>;

    /// Submit a job under this strategy's policy.
    ///
    /// Queue-backed strategies return once the job is enqueued; inline
    /// strategies return after it ran. Job-body failures are reported through
    /// the job itself, never through this result.
    fn process(&self, job: Job) -> Result<(), StrategyError>;

    /// Graceful shutdown. Calling it again has no effect.
    fn stop(&self);

    /// Whether `process` is currently accepted.
    fn is_running(&self) -> bool;

    /// Stage a job on the strategy's queue.
    fn add_task(&self, job: Job) -> Result<(), StrategyError> {
        drop(job);
        Err(StrategyError::Unsupported {
            strategy: self.name(),
            operation: "add_task",
        })
    }

    /// Pop the oldest queued job, if the strategy has a queue.
    fn remove_task(&self) -> Option<Job> {
        None
    }

    /// Point-in-time emptiness check. Not atomic with any later call.
    fn has_no_tasks_queued(&self) -> bool {
        true
    }
}

/// Lifecycle shared by the strategy implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Strategy-level errors, returned synchronously to the caller.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{strategy} strategy is not initialized")]
    NotInitialized { strategy: &'static str },

    #[error("{strategy} strategy is already initialized")]
    AlreadyInitialized { strategy: &'static str },

    #[error("{operation} is not supported by the {strategy} strategy")]
    Unsupported {
        strategy: &'static str,
        operation: &'static str,
    },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawnFailed(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Module function '{symbol}' failed with status {code}")]
    InvocationFailed { symbol: String, code: i32 },
}

impl StrategyError {
    /// Misuse of the API. Retrying the same call will not help.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized { .. }
                | Self::AlreadyInitialized { .. }
                | Self::Unsupported { .. }
                | Self::InvalidJob(_)
        )
    }

    /// Environment failure. The strategy stays usable for a corrected retry.
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::Module(_) | Self::ThreadSpawnFailed(_))
    }
}
