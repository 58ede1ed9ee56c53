//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `TS_EXEC_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TS_EXEC_WORKER_THREADS` | 0 | Thread pool workers (0 = auto) |
//! | `TS_EXEC_TASK_QUEUE_THREADS` | 1 | Task queue workers |
//! | `TS_EXEC_POLL_INTERVAL_MS` | 10 | Idle poll interval of the thread pool |
//! | `TS_EXEC_STACK_SIZE` | 0 | Worker stack size in bytes (0 = platform default) |
//! | `TS_EXEC_SHUTDOWN_POLICY` | drop | Queued jobs at stop: `drop` or `drain` |
//! | `TS_EXEC_MODULE_PATH` | unset | Shared module for the module strategy |
//! | `TS_EXEC_APPLICATION_PATH` | /opt/tissuestack | Application root |
//! | `TS_EXEC_MAX_REQUEST_LENGTH` | 4096 | Max raw request length (bytes) |
//! | `TS_EXEC_LOG_FORMAT` | json | `json` or `pretty` |
//! | `TS_EXEC_LOG_LEVEL` | info | Log filter directive |

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::execution::{ShutdownPolicy, ThreadPoolConfig, WaitMode};
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_APPLICATION_PATH: &str = "/opt/tissuestack";
pub const DEFAULT_MAX_REQUEST_LENGTH: usize = 4096;

const MIN_REQUEST_LENGTH: usize = 64;
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub application_path: String,
    pub tasks_path: String,
    pub worker_threads: usize,
    pub task_queue_threads: usize,
    pub poll_interval_ms: u64,
    pub stack_size: usize,
    pub shutdown_policy: &'static str,
    pub module_path: Option<String>,
    pub max_request_length: usize,
    pub log_format: &'static str,
    pub log_level: String,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub application_path: PathBuf,
    pub worker_pool: ThreadPoolConfig,
    pub task_queue: ThreadPoolConfig,
    pub module_path: Option<PathBuf>,
    pub max_request_length: usize,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read a non-empty string env var.
fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Stack size 0 keeps the platform default; anything else gets a floor.
fn load_stack_size() -> usize {
    match parse_usize("TS_EXEC_STACK_SIZE", 0) {
        0 => 0,
        n => n.max(MIN_STACK_SIZE),
    }
}

fn load_shutdown_policy() -> ShutdownPolicy {
    non_empty("TS_EXEC_SHUTDOWN_POLICY")
        .and_then(|v| ShutdownPolicy::parse(&v))
        .unwrap_or_default()
}

/// Load thread pool configuration from environment.
fn load_worker_pool(stack_size: usize, shutdown_policy: ShutdownPolicy) -> ThreadPoolConfig {
    let num_threads = parse_usize("TS_EXEC_WORKER_THREADS", 0);
    let poll_ms = parse_u64("TS_EXEC_POLL_INTERVAL_MS", 10).clamp(1, 1000);
    ThreadPoolConfig {
        num_threads,
        stack_size,
        wait_mode: WaitMode::Poll(Duration::from_millis(poll_ms)),
        shutdown_policy,
        ..ThreadPoolConfig::default()
    }
}

/// Load task queue configuration from environment.
fn load_task_queue(stack_size: usize, shutdown_policy: ShutdownPolicy) -> ThreadPoolConfig {
    let num_threads = parse_usize("TS_EXEC_TASK_QUEUE_THREADS", 1).max(1);
    ThreadPoolConfig {
        stack_size,
        shutdown_policy,
        ..ThreadPoolConfig::blocking(num_threads)
    }
}

/// Load logging configuration from environment. Logs go to stderr; the CLI
/// and embedding server may point `output_path` elsewhere.
fn load_log_config() -> LogConfig {
    let format = non_empty("TS_EXEC_LOG_FORMAT")
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    let level = non_empty("TS_EXEC_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    LogConfig {
        format,
        level,
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let application_path = non_empty("TS_EXEC_APPLICATION_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_APPLICATION_PATH));
    let max_request_length =
        parse_usize("TS_EXEC_MAX_REQUEST_LENGTH", DEFAULT_MAX_REQUEST_LENGTH).max(MIN_REQUEST_LENGTH);
    let stack_size = load_stack_size();
    let shutdown_policy = load_shutdown_policy();

    EnvConfig {
        application_path,
        worker_pool: load_worker_pool(stack_size, shutdown_policy),
        task_queue: load_task_queue(stack_size, shutdown_policy),
        module_path: non_empty("TS_EXEC_MODULE_PATH").map(PathBuf::from),
        max_request_length,
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Directory holding the task files of long-running jobs.
    pub fn tasks_path(&self) -> PathBuf {
        self.application_path.join("tasks")
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let poll_interval_ms = match self.worker_pool.wait_mode {
            WaitMode::Poll(interval) => interval.as_millis() as u64,
            WaitMode::Block => 0,
        };
        EffectiveConfig {
            application_path: self.application_path.display().to_string(),
            tasks_path: self.tasks_path().display().to_string(),
            worker_threads: self.worker_pool.resolved_threads(),
            task_queue_threads: self.task_queue.resolved_threads(),
            poll_interval_ms,
            stack_size: self.worker_pool.stack_size,
            shutdown_policy: self.worker_pool.shutdown_policy.as_str(),
            module_path: self.module_path.as_ref().map(|p| p.display().to_string()),
            max_request_length: self.max_request_length,
            log_format: self.log.format.as_str(),
            log_level: self.log.level.clone(),
        }
    }
}
