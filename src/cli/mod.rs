//! cli
//!
//! Command-line interface layer for depforest.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Initialize logging and load configuration
//! - Delegate to command handlers and map outcomes to an exit code
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`] and [`crate::core::verify`] for the actual work.

pub mod args;
pub mod commands;

pub use args::Cli;

use std::process::ExitCode;

use crate::engine;
use crate::telemetry;
use anyhow::Result;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();

    telemetry::init_tracing(cli.json_logs, telemetry::level_for(cli.debug, cli.quiet));

    let ctx = engine::Context {
        debug: cli.debug,
        quiet: cli.quiet,
        config_path: cli.config.clone(),
    };

    commands::dispatch(cli.command, &ctx)
}
