//! cli::commands::verify
//!
//! Compare a cloned layout with an expected layout file.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::{load_config, manifest_reader};
use crate::core::paths::LayoutPaths;
use crate::core::verify::{ExpectedLayout, LayoutVerifier};
use crate::engine::Context;

/// Run the verify command.
///
/// Exits with failure when any discrepancy is found.
pub fn verify(
    ctx: &Context,
    repos_folder: &Path,
    git_dir_folder: &Path,
    expected: &Path,
    json: bool,
) -> Result<ExitCode> {
    let config = load_config(ctx)?;
    let paths =
        LayoutPaths::resolve(repos_folder, git_dir_folder).context("invalid layout folders")?;

    let expected = ExpectedLayout::load(expected).context("failed to load expected layout")?;
    let verifier = LayoutVerifier::new(manifest_reader(&config));
    let discrepancies = verifier
        .verify(&paths.repos_folder, &paths.git_dir_folder, &expected)
        .context("verification failed")?;

    if json {
        let out =
            serde_json::to_string_pretty(&discrepancies).context("failed to serialize result")?;
        println!("{out}");
    } else if discrepancies.is_empty() {
        if !ctx.quiet {
            println!("Layout matches");
        }
    } else {
        for discrepancy in &discrepancies {
            println!("{discrepancy}");
        }
        println!("{} discrepancies", discrepancies.len());
    }

    Ok(if discrepancies.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
