//! cli::commands::snapshot
//!
//! Print an existing clone as an expected-layout file.
//!
//! The output feeds `depforest verify --expected`.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::{load_config, manifest_reader};
use crate::core::paths::LayoutPaths;
use crate::cli::args::SnapshotFormat;
use crate::core::verify::LayoutVerifier;
use crate::engine::Context;

/// Run the snapshot command.
pub fn snapshot(
    ctx: &Context,
    repos_folder: &Path,
    git_dir_folder: &Path,
    format: SnapshotFormat,
) -> Result<ExitCode> {
    let config = load_config(ctx)?;
    let paths =
        LayoutPaths::resolve(repos_folder, git_dir_folder).context("invalid layout folders")?;

    let layout = LayoutVerifier::new(manifest_reader(&config))
        .snapshot(&paths.repos_folder, &paths.git_dir_folder)
        .context("failed to read layout")?;

    let out = match format {
        SnapshotFormat::Toml => toml::to_string_pretty(&layout).context("failed to render TOML")?,
        SnapshotFormat::Json => {
            serde_json::to_string_pretty(&layout).context("failed to render JSON")?
        }
    };
    print!("{out}");
    if format == SnapshotFormat::Json {
        println!();
    }

    Ok(ExitCode::SUCCESS)
}
