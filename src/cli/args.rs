//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Warnings and errors only
//! - `--json-logs`: Emit logs as JSON lines on stderr
//! - `--config <path>`: Use this configuration file

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// depforest - clone a repository dependency graph into a shared git-dir store
#[derive(Parser, Debug)]
#[command(name = "depforest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file (overrides DEPFOREST_CONFIG and the default search)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone a repository and everything its manifests reach
    #[command(
        name = "clone",
        long_about = "Clone a repository and everything its manifests reach.\n\n\
            Each repository gets one git dir in the git-dir folder. Every \
            (repository, revision) reached gets a versioned working tree \
            `<name>.<revision>` in the repos folder, and each repository gets one \
            master tree `<name>` at the first revision reached.\n\n\
            Failures below the root are reported and skipped. A root failure \
            exits nonzero and leaves nothing behind.",
        after_help = "\
EXAMPLES:
    # Clone the full graph
    depforest clone --repo https://example.com/org/app --version main \\
        --git-dir-folder ./gitdirs --repos-folder ./repos

    # Root and direct dependencies only, skipping two repositories
    depforest clone --repo https://example.com/org/app --version v1.2 \\
        --git-dir-folder ./gitdirs --repos-folder ./repos \\
        --depth 1 --ignore-repos 'https://example.com/org/a;https://example.com/org/b'"
    )]
    Clone(CloneArgs),

    /// Compare a cloned layout with an expected layout file
    #[command(
        name = "verify",
        long_about = "Compare a cloned layout with an expected layout file.\n\n\
            Every discrepancy is listed. Exits nonzero when any is found."
    )]
    Verify {
        /// Folder holding the working trees
        #[arg(long, value_name = "PATH")]
        repos_folder: PathBuf,

        /// Folder holding the git dirs
        #[arg(long, value_name = "PATH")]
        git_dir_folder: PathBuf,

        /// Expected layout (.toml or .json)
        #[arg(long, value_name = "FILE")]
        expected: PathBuf,

        /// Print discrepancies as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the expected-layout description of an existing clone
    Snapshot {
        /// Folder holding the working trees
        #[arg(long, value_name = "PATH")]
        repos_folder: PathBuf,

        /// Folder holding the git dirs
        #[arg(long, value_name = "PATH")]
        git_dir_folder: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = SnapshotFormat::Toml)]
        format: SnapshotFormat,
    },
}

/// Arguments of `depforest clone`.
#[derive(clap::Args, Debug)]
pub struct CloneArgs {
    /// Root repository URI
    #[arg(long, value_name = "URI")]
    pub repo: String,

    /// Root revision (branch, tag or commit)
    #[arg(long = "version", value_name = "REV")]
    pub revision: String,

    /// Folder for the shared git dirs
    #[arg(long, value_name = "PATH")]
    pub git_dir_folder: PathBuf,

    /// Folder for the working trees
    #[arg(long, value_name = "PATH")]
    pub repos_folder: PathBuf,

    /// Repositories never entered, separated by ';'
    #[arg(long, value_name = "URIS", value_delimiter = ';')]
    pub ignore_repos: Vec<String>,

    /// Dependency hops to follow from the root
    #[arg(long, value_name = "N")]
    pub depth: Option<u32>,

    /// Follow toolset dependencies too
    #[arg(long)]
    pub include_toolset: bool,

    /// Concurrent clone tasks
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Print the clone report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Snapshot output formats.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    Toml,
    Json,
}
