//! The process-wide online dispatcher.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::execution::{Job, ProcessingStrategy, StrategyError};
use crate::telemetry::{DispatchSpan, SpanExt};

use super::collaborator::{ClientHandle, Collaborators};
use super::filter::{FilterChain, Rejection};
use super::request::{RawRequest, Request, RequestKind};
use super::task::{Task, TaskRecord, TaskRegistry, TaskStatus};

/// Global dispatcher instance
static INSTANCE: OnceLock<OnlineExecutor> = OnceLock::new();

/// Reason given when no filter classified a request.
const UNKNOWN_KIND: &str = "unable to determine request kind";

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Online executor has been shut down")]
    ShutDown,

    #[error("Online executor already installed")]
    AlreadyInstalled,

    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

impl ExecuteError {
    pub fn is_programmer_error(&self) -> bool {
        match self {
            Self::ShutDown | Self::AlreadyInstalled => true,
            Self::Strategy(e) => e.is_programmer_error(),
        }
    }
}

/// What `execute` did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the strategy as a job for the routed collaborator.
    Dispatched { request_id: Uuid, kind: RequestKind },
    /// Stopped before routing; the client has been told why.
    Rejected { filter: &'static str, reason: String },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            Self::Dispatched { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DispatchStats {
    pub requests_dispatched: u64,
    pub requests_rejected: u64,
    pub tasks_submitted: u64,
    pub submit_failures: u64,
    pub tasks_tracked: usize,
}

#[derive(Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    rejected: AtomicU64,
    tasks: AtomicU64,
    submit_failures: AtomicU64,
}

/// Routes client requests and internal tasks onto a caller-chosen strategy.
///
/// There is one per process: [`install`](Self::install) wires it with real
/// filters and collaborators, [`instance`](Self::instance) returns it (creating
/// a default one if nothing was installed). The filter chain and collaborators
/// never change after construction.
pub struct OnlineExecutor {
    filters: FilterChain,
    collaborators: Collaborators,
    tasks: Arc<TaskRegistry>,
    counters: DispatchCounters,
    shut_down: AtomicBool,
}

impl OnlineExecutor {
    pub(crate) fn new(filters: FilterChain, collaborators: Collaborators) -> Self {
        Self {
            filters,
            collaborators,
            tasks: TaskRegistry::new(),
            counters: DispatchCounters::default(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Install the process-wide dispatcher. Fails if one already exists.
    pub fn install(
        filters: FilterChain,
        collaborators: Collaborators,
    ) -> Result<&'static OnlineExecutor, ExecuteError> {
        INSTANCE
            .set(Self::new(filters, collaborators))
            .map_err(|_| ExecuteError::AlreadyInstalled)?;
        tracing::info!("online executor installed");
        INSTANCE.get().ok_or(ExecuteError::AlreadyInstalled)
    }

    /// The process-wide dispatcher. Without a prior `install` this creates one
    /// with the standard filter chain and no collaborators.
    pub fn instance() -> &'static OnlineExecutor {
        INSTANCE.get_or_init(|| {
            let config = crate::config::load();
            tracing::info!(
                max_request_length = config.max_request_length,
                "online executor created with default collaborators"
            );
            Self::new(
                FilterChain::standard(config.max_request_length),
                Collaborators::default(),
            )
        })
    }

    /// Filter, classify and route one client request, then submit it to
    /// `strategy`.
    ///
    /// Rejections are a normal outcome: the client is told the reason and the
    /// caller gets [`DispatchOutcome::Rejected`]. An error means the request
    /// passed but the strategy refused the job.
    pub fn execute(
        &self,
        strategy: &dyn ProcessingStrategy,
        raw: impl Into<RawRequest>,
        client: ClientHandle,
    ) -> Result<DispatchOutcome, ExecuteError> {
        self.ensure_open()?;

        let request = Request::new(raw);
        let span = DispatchSpan::new(&request.id().to_string(), client.descriptor(), strategy.name());
        let _enter = span.enter();

        let request = match self.classify(request) {
            Ok(request) => request,
            Err(rejection) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                span.record("status", "rejected");
                span.record("error.message", rejection.reason.as_str());
                tracing::warn!(filter = rejection.filter, reason = %rejection.reason, "request rejected");
                client.reject(&rejection.reason);
                return Ok(DispatchOutcome::Rejected {
                    filter: rejection.filter,
                    reason: rejection.reason,
                });
            }
        };

        // classify() guarantees a kind
        let kind = request.kind().unwrap_or(RequestKind::Service);
        let request_id = request.id();
        span.record("kind", kind.as_str());

        let handler = Arc::clone(self.collaborators.for_kind(kind));
        let job = Job::new(format!("{}:{}", kind, request_id), move |ctx| {
            handler.handle(&request, &*client, ctx).map_err(|e| {
                client.reject(&e.to_string());
                e
            })
        });

        let result = strategy.process(job);
        span.record_result(&result);
        match result {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind = kind.as_str(), "request dispatched");
                Ok(DispatchOutcome::Dispatched { request_id, kind })
            }
            Err(e) => {
                self.counters.submit_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "strategy refused request job");
                Err(e.into())
            }
        }
    }

    /// Submit a pre-built task to `strategy`, bypassing the filters.
    ///
    /// The task is tracked as queued, in process, then finished, erroneous or
    /// cancelled (if the job is discarded before running).
    pub fn execute_task(
        &self,
        strategy: &dyn ProcessingStrategy,
        task: Arc<dyn Task>,
    ) -> Result<(), ExecuteError> {
        self.ensure_open()?;

        let task_id = task.id().to_string();
        self.tasks.set(&task_id, TaskStatus::Queued, None);

        let registry = Arc::clone(&self.tasks);
        let runner = Arc::clone(&task);
        let running_id = task_id.clone();
        let job = Job::new(format!("task:{}", task_id), move |ctx| {
            registry.set(&running_id, TaskStatus::InProcess, None);
            runner.run(ctx)
        });

        let registry = Arc::clone(&self.tasks);
        let finished_id = task_id.clone();
        let job = job.with_reporter(move |outcome| {
            registry.record_outcome(&finished_id, &outcome);
            task.on_finished(&outcome);
        });

        match strategy.process(job) {
            Ok(()) => {
                self.counters.tasks.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(task_id = %task_id, strategy = strategy.name(), "task submitted");
                Ok(())
            }
            Err(e) => {
                self.counters.submit_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(task_id = %task_id, error = %e, "strategy refused task");
                Err(e.into())
            }
        }
    }

    /// Last known status of a task submitted through `execute_task`.
    pub fn task_status(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id)
    }

    /// Stop tracking a task, returning its last record.
    pub fn forget_task(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.remove(task_id)
    }

    /// Drop finished, erroneous and cancelled records older than `max_age`.
    /// Queued and running tasks are never pruned.
    pub fn prune_tasks(&self, max_age: chrono::Duration) -> usize {
        let removed = self.tasks.prune_terminal(chrono::Utc::now() - max_age);
        if removed > 0 {
            tracing::debug!(removed, "pruned task records");
        }
        removed
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            requests_dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            requests_rejected: self.counters.rejected.load(Ordering::Relaxed),
            tasks_submitted: self.counters.tasks.load(Ordering::Relaxed),
            submit_failures: self.counters.submit_failures.load(Ordering::Relaxed),
            tasks_tracked: self.tasks.len(),
        }
    }

    /// Tear the dispatcher down. Only the first call has an effect; it runs
    /// each collaborator's shutdown hook and returns `true`.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        for handler in self.collaborators.all() {
            handler.shutdown();
        }
        tracing::info!(stats = ?self.stats(), "online executor shut down");
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), ExecuteError> {
        if self.is_shut_down() {
            return Err(ExecuteError::ShutDown);
        }
        Ok(())
    }

    /// Run the filter chain and require a request kind.
    fn classify(&self, request: Request) -> Result<Request, Rejection> {
        let request = self.filters.apply(request)?;
        if request.kind().is_none() {
            return Err(Rejection {
                filter: "dispatcher",
                reason: UNKNOWN_KIND.to_string(),
            });
        }
        Ok(request)
    }
}

impl std::fmt::Debug for OnlineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnlineExecutor")
            .field("filters", &self.filters)
            .field("collaborators", &self.collaborators)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
