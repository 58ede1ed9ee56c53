// Copyright 2024-2026 TissueStack Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for `tissue-exec-cli`.
//!
//! ## Usage
//!
//! ```bash
//! tissue-exec-cli config show [--json]   # Effective configuration
//! tissue-exec-cli config defaults        # Documented defaults
//! tissue-exec-cli config validate        # Exit 1 on misconfiguration
//! tissue-exec-cli invoke <module> <symbol> [argument]
//! ```

pub mod config_cmd;
pub mod invoke_cmd;

pub use invoke_cmd::run_invoke;
