//! depforest - clone a repository dependency graph into a shared store
//!
//! Starting from a root repository at a revision, depforest reads each
//! repository's dependency manifest and clones every reachable
//! `(repository, revision)` into a repos folder. Git metadata lives once per
//! repository in a git-dir store and every working tree points at it.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Breadth-first graph cloner and its report
//! - [`store`] - Shared git-dir store: acquire, fetch, remove
//! - [`core`] - Domain types, layout paths, manifests, verification, config
//! - [`git`] - Single interface for all Git operations
//! - [`telemetry`] - Tracing setup
//!
//! # Correctness Invariants
//!
//! 1. Each `(repository, revision)` is cloned at most once per run
//! 2. One store entry per repository, never two per folder name
//! 3. No two tasks write the same working-tree folder
//! 4. A failed repository leaves no partial tree behind
//! 5. Verification reports every discrepancy, never just the first

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod store;
pub mod telemetry;
