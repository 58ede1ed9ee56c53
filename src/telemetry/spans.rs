//! Standard spans for jobs and dispatched requests.

use std::time::Duration;

use tracing::{info_span, Span};

use crate::execution::JobOutcome;

/// Extension trait for recording results into a span.
pub trait SpanExt {
    /// Record `status` and, on error, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record a job outcome and its run time; logs non-successful outcomes.
    fn record_outcome(&self, outcome: &JobOutcome, elapsed: Duration);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_outcome(&self, outcome: &JobOutcome, elapsed: Duration) {
        self.record("status", outcome.as_str());
        self.record("latency_ms", elapsed.as_millis() as u64);
        match outcome {
            JobOutcome::Failed(message) | JobOutcome::Panicked(message) => {
                self.record("error.message", message.as_str());
                self.in_scope(|| {
                    tracing::warn!(outcome = outcome.as_str(), error = %message, "job did not complete");
                });
            }
            JobOutcome::Completed | JobOutcome::Discarded => {}
        }
    }
}

/// Factory for job spans.
pub struct JobSpan;

impl JobSpan {
    /// Fields: `job_id`, `strategy`, and `status`, `error.message`,
    /// `latency_ms` to be filled in after the job ran.
    pub fn new(job_id: u64, strategy: &str) -> Span {
        info_span!(
            "job",
            job_id,
            strategy = %strategy,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}

/// Factory for request dispatch spans.
pub struct DispatchSpan;

impl DispatchSpan {
    /// Fields: `request_id`, `client`, `strategy`, and `kind`, `status`,
    /// `error.message` to be filled in during dispatch.
    pub fn new(request_id: &str, client: i64, strategy: &str) -> Span {
        info_span!(
            "dispatch",
            request_id = %request_id,
            client,
            strategy = %strategy,
            kind = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
