//! Telemetry for the execution core.
//!
//! Structured logging through `tracing`, with standard spans for jobs and
//! dispatched requests. Output goes to stderr or a log file.

mod logging;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{DispatchSpan, JobSpan, SpanExt};
