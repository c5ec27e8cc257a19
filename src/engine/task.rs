//! engine::task
//!
//! One unit of traversal work: acquire, fetch, materialize, read manifest.
//!
//! Tasks run on the blocking pool. A failed task removes every tree it wrote
//! and discards a store entry it created, so a failure leaves nothing behind.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::report::{FailureKind, TreeKind, WorkingTree};
use super::Shared;
use crate::core::manifest::{DependencyEdge, ManifestError};
use crate::core::types::{Oid, RepositoryIdentity, Revision};
use crate::git::{read_redirect, write_redirect, Git, GitError};
use crate::store::{GitDirHandle, StoreError};

/// A pending visit of one repository at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloneTask {
    pub identity: RepositoryIdentity,
    /// URI the identity was parsed from; used for fetching
    pub uri: String,
    pub revision: Revision,
    /// How many more dependency hops may follow this one
    pub depth_remaining: u32,
}

impl CloneTask {
    /// The task that follows `edge` out of this one.
    ///
    /// Only meaningful when `depth_remaining > 0`.
    pub fn child(&self, edge: &DependencyEdge) -> CloneTask {
        CloneTask {
            identity: edge.target.clone(),
            uri: edge.target_uri.clone(),
            revision: edge.revision.clone(),
            depth_remaining: self.depth_remaining.saturating_sub(1),
        }
    }

    /// Visited-set key.
    pub fn key(&self) -> (RepositoryIdentity, Revision) {
        (self.identity.clone(), self.revision.clone())
    }
}

/// Errors that fail a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Manifest(ManifestError),

    #[error("checkout failed: {0}")]
    Checkout(#[from] GitError),

    /// The tree folder exists but does not belong to this store entry.
    #[error("{path} already exists and is not a tree of {git_dir}")]
    Occupied { path: PathBuf, git_dir: PathBuf },

    /// Another task of this run already owns the folder.
    #[error("folder '{folder}' belongs to {existing}, {requested} cannot share it")]
    FolderCollision {
        folder: String,
        existing: String,
        requested: String,
    },

    /// The tree folder exists for this store entry but holds another commit.
    #[error("{path} already holds a checkout other than {commit}")]
    Mismatch { path: PathBuf, commit: Oid },

    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TaskError {
    /// Failure category for the report.
    pub fn kind(&self) -> FailureKind {
        match self {
            TaskError::Store(StoreError::NameCollision { .. })
            | TaskError::FolderCollision { .. }
            | TaskError::Mismatch { .. } => FailureKind::NameCollision,
            TaskError::Store(_) => FailureKind::Fetch,
            TaskError::Manifest(_) => FailureKind::ManifestMalformed,
            TaskError::Checkout(_) | TaskError::Occupied { .. } | TaskError::Io { .. } => {
                FailureKind::Checkout
            }
        }
    }
}

/// A task plus the coordinator's decision about the master tree.
#[derive(Debug, Clone)]
pub(crate) struct TaskPlan {
    pub task: CloneTask,
    pub create_master: bool,
}

/// What a successful task produced.
#[derive(Debug)]
pub(crate) struct TaskOutput {
    pub trees: Vec<WorkingTree>,
    pub edges: BTreeSet<DependencyEdge>,
}

/// Run one task to completion.
pub(crate) fn run(shared: &Shared, plan: &TaskPlan, retries: u32) -> Result<TaskOutput, TaskError> {
    let task = &plan.task;
    let handle = shared.store.acquire(&task.identity, &task.uri)?;

    let mut written = Vec::new();
    match run_acquired(shared, plan, &handle, retries, &mut written) {
        // The handle's reference stays with the trees.
        Ok(output) => Ok(output),
        Err(e) => {
            for path in written.iter().rev() {
                if let Err(err) = fs::remove_dir_all(path) {
                    warn!(path = %path.display(), error = %err, "failed to remove partial tree");
                }
            }
            if let Err(err) = shared.store.discard(handle) {
                warn!(identity = %task.identity, error = %err, "failed to discard store entry");
            }
            Err(e)
        }
    }
}

fn run_acquired(
    shared: &Shared,
    plan: &TaskPlan,
    handle: &GitDirHandle,
    retries: u32,
    written: &mut Vec<PathBuf>,
) -> Result<TaskOutput, TaskError> {
    let task = &plan.task;
    let name = task.identity.name();
    let commit = shared
        .store
        .ensure_revision(handle, &task.revision, retries)?;

    let tree = |path: PathBuf, kind: TreeKind| WorkingTree {
        identity: task.identity.clone(),
        revision: task.revision.clone(),
        commit: commit.clone(),
        path,
        git_dir: handle.path.clone(),
        kind,
    };

    let versioned = shared.paths.versioned_dir(name, &task.revision);
    ensure_tree(handle, &commit, &versioned, TreeKind::Versioned, written)?;
    let mut trees = vec![tree(versioned.clone(), TreeKind::Versioned)];

    let edges = match shared.manifest.read(&task.identity, &versioned) {
        Ok(edges) => edges,
        Err(ManifestError::Missing { .. }) => BTreeSet::new(),
        Err(e) => return Err(TaskError::Manifest(e)),
    };

    if plan.create_master {
        let master = shared.paths.master_dir(name);
        ensure_master(shared, handle, &commit, &master, written)?;
        trees.push(tree(master, TreeKind::Master));
    }

    debug!(identity = %task.identity, revision = %task.revision, edges = edges.len(), "task done");
    Ok(TaskOutput { trees, edges })
}

/// Give the master tree of `versioned`'s repository to its revision.
///
/// Used when the task that owned the master failed and a sibling of the
/// same repository succeeded in the same level.
pub(crate) fn promote_master(
    shared: &Shared,
    task: &CloneTask,
    versioned: &WorkingTree,
) -> Result<WorkingTree, TaskError> {
    let handle = shared.store.acquire(&task.identity, &task.uri)?;
    let master = shared.paths.master_dir(task.identity.name());

    let mut written = Vec::new();
    match ensure_master(shared, &handle, &versioned.commit, &master, &mut written) {
        Ok(()) => Ok(WorkingTree {
            path: master,
            kind: TreeKind::Master,
            ..versioned.clone()
        }),
        Err(e) => {
            for path in &written {
                if let Err(err) = fs::remove_dir_all(path) {
                    warn!(path = %path.display(), error = %err, "failed to remove partial tree");
                }
            }
            shared.store.release(handle);
            Err(e)
        }
    }
}

fn ensure_master(
    shared: &Shared,
    handle: &GitDirHandle,
    commit: &Oid,
    master: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<(), TaskError> {
    if ensure_tree(handle, commit, master, TreeKind::Master, written)? {
        shared.store.attach_master(handle, commit, master)?;
    }
    Ok(())
}

/// Write `commit` into `dest` unless it is already there. Returns whether
/// the tree was written.
///
/// An existing folder is accepted only when it points at this store entry
/// and holds `commit`: a versioned tree by content, a master tree by the
/// entry's `HEAD`.
fn ensure_tree(
    handle: &GitDirHandle,
    commit: &Oid,
    dest: &Path,
    kind: TreeKind,
    written: &mut Vec<PathBuf>,
) -> Result<bool, TaskError> {
    if dest.exists() {
        let target = read_redirect(dest).map_err(|e| TaskError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        let expected = handle.path.display().to_string();
        if !target.is_some_and(|t| t.eq_ignore_ascii_case(&expected)) {
            return Err(TaskError::Occupied {
                path: dest.to_path_buf(),
                git_dir: handle.path.clone(),
            });
        }

        let git = Git::open_store(&handle.path)?;
        let current = match kind {
            TreeKind::Versioned => git.tree_matches(commit, dest)?,
            TreeKind::Master => git.head_commit()?.as_ref() == Some(commit),
        };
        if !current {
            return Err(TaskError::Mismatch {
                path: dest.to_path_buf(),
                commit: commit.clone(),
            });
        }
        debug!(path = %dest.display(), "tree already present");
        return Ok(false);
    }

    written.push(dest.to_path_buf());
    let git = Git::open_store(&handle.path)?;
    git.materialize(commit, dest)?;
    write_redirect(dest, &handle.path)?;
    Ok(true)
}
