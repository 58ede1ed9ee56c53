//! Execution strategies for TissueStack work.
//!
//! Every strategy implements [`ProcessingStrategy`] (`init` / `process` /
//! `stop`) and is chosen by the caller, independently of what the work does:
//!
//! - [`ThreadPool`]: fixed worker pool, idle workers poll the queue
//! - [`TaskQueueExecutor`]: same pool, idle workers block until woken
//! - [`SequentialExecutor`]: runs each job on the calling thread
//! - [`DynamicModuleExecutor`]: calls functions exported by a shared module

mod job;
mod module;
mod queue;
mod sequential;
mod strategy;
mod task_queue;
mod thread_pool;
mod worker;

pub use job::{Job, JobBody, JobContext, JobError, JobFn, JobHandle, JobOutcome};
pub use module::{
    DynamicModuleExecutor, LibraryLoader, LoadedModule, ModuleEntryPoint, ModuleError,
    ModuleLoader,
};
pub use sequential::SequentialExecutor;
pub use strategy::{ProcessingStrategy, StrategyError};
pub use task_queue::TaskQueueExecutor;
pub use thread_pool::{ShutdownPolicy, ThreadPool, ThreadPoolConfig, ThreadPoolStats, WaitMode};
pub use worker::{WorkerState, WorkerThread};
