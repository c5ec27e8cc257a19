//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Resolves folders and loads configuration
//! 2. Calls the engine or the verifier
//! 3. Formats and displays output, returning the exit code
//!
//! `clone` is async because the graph cloner runs its levels on a tokio
//! worker pool; the handler owns the runtime.

mod clone;
mod snapshot;
mod verify;

pub use clone::clone;
pub use snapshot::snapshot;
pub use verify::verify;

use std::process::ExitCode;

use crate::cli::args::Command;
use crate::core::config::Config;
use crate::core::manifest::ManifestReader;
use crate::engine::Context;
use anyhow::{Context as _, Result};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<ExitCode> {
    match command {
        Command::Clone(args) => clone::clone(ctx, args),
        Command::Verify {
            repos_folder,
            git_dir_folder,
            expected,
            json,
        } => verify::verify(ctx, &repos_folder, &git_dir_folder, &expected, json),
        Command::Snapshot {
            repos_folder,
            git_dir_folder,
            format,
        } => snapshot::snapshot(ctx, &repos_folder, &git_dir_folder, format),
    }
}

/// Load configuration for `ctx`.
fn load_config(ctx: &Context) -> Result<Config> {
    let config = Config::load(ctx.config_path.as_deref()).context("failed to load configuration")?;
    if let Some(source) = config.source() {
        tracing::debug!(path = %source.display(), "loaded configuration");
    }
    Ok(config)
}

/// Manifest reader honoring the configured manifest path.
fn manifest_reader(config: &Config) -> ManifestReader {
    ManifestReader::new(config.manifest_path())
}
