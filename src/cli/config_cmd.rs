// Copyright 2024-2026 TissueStack Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables.

use tracing_subscriber::EnvFilter;

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as key-value pairs (or JSON) to stdout.
pub fn run_show(json: bool) -> i32 {
    let cfg = config::load().effective_config();
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to serialize config: {}", e);
                return 1;
            }
        }
    } else {
        print_config(&cfg);
    }
    0
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("TS_EXEC_WORKER_THREADS=0");
    println!("TS_EXEC_TASK_QUEUE_THREADS=1");
    println!("TS_EXEC_POLL_INTERVAL_MS=10");
    println!("TS_EXEC_STACK_SIZE=0");
    println!("TS_EXEC_SHUTDOWN_POLICY=drop");
    println!("TS_EXEC_MODULE_PATH=");
    println!("TS_EXEC_APPLICATION_PATH={}", config::DEFAULT_APPLICATION_PATH);
    println!("TS_EXEC_MAX_REQUEST_LENGTH={}", config::DEFAULT_MAX_REQUEST_LENGTH);
    println!("TS_EXEC_LOG_FORMAT=json");
    println!("TS_EXEC_LOG_LEVEL=info");
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load());
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(module) = &env.module_path {
        if !module.is_file() {
            warnings.push(format!(
                "TS_EXEC_MODULE_PATH ({}) is not a file; the module strategy will fail to init",
                module.display()
            ));
        }
    }

    if !env.application_path.is_dir() {
        warnings.push(format!(
            "TS_EXEC_APPLICATION_PATH ({}) is not a directory",
            env.application_path.display()
        ));
    } else if !env.tasks_path().is_dir() {
        warnings.push(format!(
            "tasks directory {} does not exist",
            env.tasks_path().display()
        ));
    }

    if let Err(e) = EnvFilter::try_new(&env.log.level) {
        warnings.push(format!("TS_EXEC_LOG_LEVEL ({}) is invalid: {}", env.log.level, e));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("TS_EXEC_WORKER_THREADS={}", cfg.worker_threads);
    println!("TS_EXEC_TASK_QUEUE_THREADS={}", cfg.task_queue_threads);
    println!("TS_EXEC_POLL_INTERVAL_MS={}", cfg.poll_interval_ms);
    println!("TS_EXEC_STACK_SIZE={}", cfg.stack_size);
    println!("TS_EXEC_SHUTDOWN_POLICY={}", cfg.shutdown_policy);
    println!("TS_EXEC_MODULE_PATH={}", cfg.module_path.as_deref().unwrap_or(""));
    println!("TS_EXEC_APPLICATION_PATH={}", cfg.application_path);
    println!("TS_EXEC_MAX_REQUEST_LENGTH={}", cfg.max_request_length);
    println!("TS_EXEC_LOG_FORMAT={}", cfg.log_format);
    println!("TS_EXEC_LOG_LEVEL={}", cfg.log_level);
}
