//! tissue-exec command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `tissue-exec-cli config show [--json]` - Effective configuration
//! - `tissue-exec-cli config defaults` - Documented defaults
//! - `tissue-exec-cli config validate` - Validate configuration (exit 0/1)
//! - `tissue-exec-cli invoke <module> <symbol> [argument]` - Call a module function

use std::process::ExitCode;

use tissue_exec::cli::{config_cmd, run_invoke};
use tissue_exec::config;
use tissue_exec::telemetry::{init_logging, LogFormat};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let json_output = args.get(3).map(|s| s.as_str()) == Some("--json");
                    exit_code(config_cmd::run_show(json_output))
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "invoke" => {
            let (Some(module), Some(symbol)) = (args.get(2), args.get(3)) else {
                eprintln!("invoke requires <module-path> and <symbol>");
                print_command_help("invoke");
                return ExitCode::FAILURE;
            };
            let argument = args.get(4).map(|s| s.as_str()).unwrap_or("");

            // Human-readable logs on stderr for interactive use.
            let mut log = config::load().log;
            log.format = LogFormat::Pretty;
            if let Err(e) = init_logging(&log) {
                eprintln!("Logging disabled: {}", e);
            }
            exit_code(run_invoke(module, symbol, argument))
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tissue-exec {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "tissue-exec - TissueStack execution core v{}

USAGE:
    tissue-exec-cli <COMMAND> [OPTIONS]

COMMANDS:
    config      Show, list defaults of, or validate configuration
    invoke      Call an exported function of a shared module
    version     Print version
    help        Print this message or the help of a command

Run 'tissue-exec-cli help <COMMAND>' for details.",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "config" => {
            eprintln!(
                "tissue-exec-cli config <SUBCOMMAND>

SUBCOMMANDS:
    show [--json]   Print the effective configuration
    defaults        Print the default configuration
    validate        Check paths and log filter (exit 1 on warnings)

Configuration is read from TS_EXEC_* environment variables."
            );
        }
        "invoke" => {
            eprintln!(
                "tissue-exec-cli invoke <MODULE-PATH> <SYMBOL> [ARGUMENT]

Loads the shared module, calls SYMBOL with ARGUMENT (default empty) and unloads.
The function must have the signature `int symbol(const char *argument)` and
return 0 on success.

EXIT CODES:
    0   Function returned 0
    1   Module or symbol could not be loaded, or the call was invalid
    2   Function returned a failure code"
            );
        }
        _ => {
            eprintln!("No help for unknown command: {}", command);
            print_usage();
        }
    }
}
