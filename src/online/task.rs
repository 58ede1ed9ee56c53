//! Internally queued long-running tasks and their status registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::execution::{JobContext, JobError, JobOutcome};

/// A pre-built unit of work submitted through
/// [`OnlineExecutor::execute_task`](super::OnlineExecutor::execute_task).
pub trait Task: Send + Sync + 'static {
    /// Stable identifier, e.g. the task file name under the tasks directory.
    fn id(&self) -> &str;

    fn run(&self, ctx: &JobContext<'_>) -> Result<(), JobError>;

    /// Called once with the final outcome, including when the task was
    /// discarded before it ran.
    fn on_finished(&self, _outcome: &JobOutcome) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProcess,
    Finished,
    Cancelled,
    Erroneous,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProcess => "in_process",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
            Self::Erroneous => "erroneous",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Erroneous)
    }

    fn from_outcome(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => Self::Finished,
            JobOutcome::Failed(_) | JobOutcome::Panicked(_) => Self::Erroneous,
            JobOutcome::Discarded => Self::Cancelled,
        }
    }
}

/// Last known state of a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub updated_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Terminal records kept before the oldest ones are evicted.
pub(crate) const DEFAULT_TERMINAL_RETENTION: usize = 1024;

/// Concurrent task id to status map shared with running jobs.
///
/// Queued and running tasks are always kept. Terminal records are capped at
/// `retention`; writing one past the cap evicts the oldest terminal records.
#[derive(Debug)]
pub(crate) struct TaskRegistry {
    records: DashMap<String, TaskRecord>,
    retention: usize,
}

impl TaskRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_retention(DEFAULT_TERMINAL_RETENTION)
    }

    pub(crate) fn with_retention(retention: usize) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            retention: retention.max(1),
        })
    }

    pub(crate) fn set(&self, task_id: &str, status: TaskStatus, message: Option<String>) {
        self.records.insert(
            task_id.to_string(),
            TaskRecord {
                task_id: task_id.to_string(),
                status,
                updated_at: Utc::now(),
                message,
            },
        );
    }

    pub(crate) fn record_outcome(&self, task_id: &str, outcome: &JobOutcome) {
        let message = match outcome {
            JobOutcome::Failed(m) | JobOutcome::Panicked(m) => Some(m.clone()),
            JobOutcome::Completed | JobOutcome::Discarded => None,
        };
        self.set(task_id, TaskStatus::from_outcome(outcome), message);
        self.enforce_retention();
    }

    pub(crate) fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.records.get(task_id).map(|r| r.value().clone())
    }

    pub(crate) fn remove(&self, task_id: &str) -> Option<TaskRecord> {
        self.records.remove(task_id).map(|(_, record)| record)
    }

    /// Drop terminal records last updated before `cutoff`. Returns how many
    /// were removed.
    pub(crate) fn prune_terminal(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(r.status.is_terminal() && r.updated_at < cutoff));
        before.saturating_sub(self.records.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    fn enforce_retention(&self) {
        let mut terminal: Vec<(DateTime<Utc>, String)> = self
            .records
            .iter()
            .filter(|r| r.status.is_terminal())
            .map(|r| (r.updated_at, r.key().clone()))
            .collect();
        if terminal.len() <= self.retention {
            return;
        }
        terminal.sort();
        let excess = terminal.len() - self.retention;
        for (_, task_id) in terminal.into_iter().take(excess) {
            self.records
                .remove_if(&task_id, |_, r| r.status.is_terminal());
        }
        tracing::debug!(evicted = excess, "task records evicted");
    }
}
