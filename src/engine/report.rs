//! engine::report
//!
//! Structured result of a clone run.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::manifest::DependencyEdge;
use crate::core::types::{Oid, RepositoryIdentity, Revision};

/// Which role a working tree plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    /// `<repos>/<name>`, one per identity, attached to the store entry
    Master,
    /// `<repos>/<name>.<revision>`, one per (identity, revision)
    Versioned,
}

/// A checked-out tree pointing at its store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingTree {
    pub identity: RepositoryIdentity,
    pub revision: Revision,
    pub commit: Oid,
    pub path: PathBuf,
    pub git_dir: PathBuf,
    pub kind: TreeKind,
}

/// Why a recorded edge was not traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Target is in the ignore list
    Ignored,
    /// Toolset edge and toolset traversal is off
    Toolset,
    /// Source was at the depth limit
    DepthExhausted,
}

/// An edge that was recorded but not followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEdge {
    pub edge: DependencyEdge,
    pub reason: SkipReason,
}

/// Category of a branch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    ManifestMalformed,
    NameCollision,
    Checkout,
}

/// A non-root repository that could not be cloned.
///
/// Its dependencies were not traversed through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure {
    pub identity: RepositoryIdentity,
    pub revision: Revision,
    pub uri: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Everything a clone run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneReport {
    /// Versioned tree of the root repository
    pub root: WorkingTree,
    /// Every tree in the forest, in traversal order
    pub trees: Vec<WorkingTree>,
    /// Every edge read from a manifest, followed or not
    pub edges: Vec<DependencyEdge>,
    /// Edges that were recorded but not followed
    pub skipped: Vec<SkippedEdge>,
    /// Repositories that failed, with the run continuing past them
    pub failures: Vec<BranchFailure>,
    /// Network fetches performed by this run
    pub fetches: usize,
}

impl CloneReport {
    /// Master trees in the forest.
    pub fn masters(&self) -> impl Iterator<Item = &WorkingTree> {
        self.trees.iter().filter(|t| t.kind == TreeKind::Master)
    }

    /// Whether any tree of `identity` is in the forest.
    pub fn contains(&self, identity: &RepositoryIdentity) -> bool {
        self.trees.iter().any(|t| &t.identity == identity)
    }

    /// The versioned tree for `identity` at `revision`.
    pub fn tree(&self, identity: &RepositoryIdentity, revision: &Revision) -> Option<&WorkingTree> {
        self.trees.iter().find(|t| {
            t.kind == TreeKind::Versioned && &t.identity == identity && &t.revision == revision
        })
    }

    /// Whether every reachable repository was cloned.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
