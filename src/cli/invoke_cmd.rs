// Copyright 2024-2026 TissueStack Contributors
// SPDX-License-Identifier: Apache-2.0

//! `invoke`: call one exported function of a shared module.
//!
//! Useful to check a module deployment without starting the server.

use crate::execution::{DynamicModuleExecutor, Job, JobOutcome, ProcessingStrategy};

/// Load `module`, call `symbol(argument)` and unload.
///
/// Exit codes: 0 success, 1 load, resolution or invalid-call failure, 2 the
/// function returned a failure code.
pub fn run_invoke(module: &str, symbol: &str, argument: &str) -> i32 {
    let executor = DynamicModuleExecutor::new(module);
    if let Err(e) = executor.init() {
        eprintln!("Failed to load {}: {}", module, e);
        return 1;
    }

    let (job, handle) = Job::module_call(symbol, argument).with_handle();
    let result = executor.process(job);
    executor.stop();

    match (result, handle.wait()) {
        (Ok(()), JobOutcome::Completed) => {
            println!("{}({:?}) succeeded", symbol, argument);
            0
        }
        (Err(e), _) if e.is_resource_error() || e.is_programmer_error() => {
            eprintln!("{}", e);
            1
        }
        (Err(e), _) => {
            eprintln!("{}", e);
            2
        }
        (Ok(()), outcome) => {
            eprintln!("{} finished as {}", symbol, outcome.as_str());
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module_exit_code() {
        assert_eq!(run_invoke("/nonexistent/libtiles.so", "tile", ""), 1);
    }

    #[test]
    fn test_non_library_file_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-library.so");
        std::fs::write(&path, b"plain text").unwrap();
        assert_eq!(run_invoke(path.to_str().unwrap(), "tile", ""), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_invalid_call_is_not_a_function_failure() {
        let Some(libc) = [
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/aarch64-linux-gnu/libc.so.6",
            "/lib64/libc.so.6",
            "/usr/lib/libc.so.6",
        ]
        .into_iter()
        .find(|p| std::path::Path::new(p).is_file()) else {
            return;
        };
        assert_eq!(run_invoke(libc, "", "1"), 1);
        assert_eq!(run_invoke(libc, "atoi", "4\02"), 1);
        assert_eq!(run_invoke(libc, "atoi", "42"), 2);
        assert_eq!(run_invoke(libc, "atoi", "0"), 0);
    }
}
