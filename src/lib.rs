//! TissueStack execution core.
//!
//! Runs units of work for the TissueStack image tile server behind one
//! uniform [`ProcessingStrategy`](execution::ProcessingStrategy): a polling
//! thread pool, a blocking task queue, inline sequential execution, or calls
//! into a dynamically loaded shared module. The [`OnlineExecutor`](online::OnlineExecutor)
//! singleton filters and routes client requests and internal tasks onto a
//! strategy chosen by the caller.
//!
//! # Example
//!
//! ```no_run
//! use tissue_exec::execution::{Job, ProcessingStrategy, TaskQueueExecutor};
//!
//! let queue = TaskQueueExecutor::new(2);
//! queue.init()?;
//! let (job, handle) = Job::new("convert", |_ctx| Ok(())).with_handle();
//! queue.process(job)?;
//! assert!(handle.wait().is_success());
//! queue.stop();
//! # Ok::<(), tissue_exec::execution::StrategyError>(())
//! ```

pub mod cli;
pub mod config;
pub mod execution;
pub mod online;
pub mod telemetry;

pub use config::EnvConfig;
pub use execution::{Job, JobOutcome, ProcessingStrategy, StrategyError};
pub use online::OnlineExecutor;
