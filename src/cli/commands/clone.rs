//! cli::commands::clone
//!
//! Clone a dependency graph.
//!
//! # Example
//!
//! ```bash
//! depforest clone --repo https://example.com/org/app --version main \
//!     --git-dir-folder ./gitdirs --repos-folder ./repos --depth 2
//! ```
//!
//! Exit status is nonzero only when the root repository fails. Failures
//! further down are listed and the run still succeeds.

use std::collections::HashSet;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::{load_config, manifest_reader};
use crate::cli::args::CloneArgs;
use crate::core::paths::LayoutPaths;
use crate::core::types::{RepositoryIdentity, Revision};
use crate::engine::{CloneError, CloneOptions, CloneReport, Context, GraphCloner};

/// Run the clone command.
pub fn clone(ctx: &Context, args: CloneArgs) -> Result<ExitCode> {
    let config = load_config(ctx)?;

    let revision = Revision::new(&args.revision).context("invalid --version")?;
    let paths = LayoutPaths::resolve(&args.repos_folder, &args.git_dir_folder)
        .context("invalid output folders")?;

    let mut options = CloneOptions::from_config(&config);
    options.ignore_repos = args
        .ignore_repos
        .iter()
        .map(|uri| uri.trim())
        .filter(|uri| !uri.is_empty())
        .map(|uri| {
            RepositoryIdentity::parse(uri)
                .with_context(|| format!("invalid --ignore-repos entry '{uri}'"))
        })
        .collect::<Result<HashSet<_>>>()?;
    if let Some(depth) = args.depth {
        options.depth_limit = depth;
    }
    if args.include_toolset {
        options.include_toolset = true;
    }
    if let Some(workers) = args.workers {
        options.workers = usize::try_from(workers).context("invalid --workers")?;
    }

    let cloner = GraphCloner::new(paths, manifest_reader(&config));
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let report = match runtime.block_on(cloner.clone(&args.repo, &revision, &options)) {
        Ok(report) => report,
        Err(err @ CloneError::RootFailed { .. }) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err).context("clone failed"),
    };

    if args.json {
        let out = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{out}");
    } else if !ctx.quiet {
        print_report(&report);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &CloneReport) {
    println!("Root: {}", report.root.path.display());
    println!(
        "Cloned {} trees ({} masters), {} edges, {} fetches",
        report.trees.len(),
        report.masters().count(),
        report.edges.len(),
        report.fetches
    );
    for tree in &report.trees {
        println!("  {} ({} @ {})", tree.path.display(), tree.identity, tree.commit.short(7));
    }
    if !report.skipped.is_empty() {
        println!("Skipped {} edges", report.skipped.len());
    }
    if !report.failures.is_empty() {
        println!("Failed:");
        for failure in &report.failures {
            println!("  {} @ {}: {}", failure.identity, failure.revision, failure.message);
        }
    }
}
