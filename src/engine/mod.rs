//! engine
//!
//! The graph cloner: bounded breadth-first traversal of the dependency graph.
//!
//! # Architecture
//!
//! The engine is the orchestrator of a clone run. It drives the store and the
//! manifest reader and produces a forest of working trees:
//!
//! 1. **Lock**: take the cross-process store lock
//! 2. **Claim**: in frontier order, reserve each task's name and folders and
//!    decide which task owns each master tree
//! 3. **Level**: run every task of the current frontier on the worker pool
//! 4. **Collect**: in frontier order, record trees and edges, hand a failed
//!    owner's master tree to its first successful sibling, filter edges,
//!    enqueue unvisited children
//! 5. **Repeat** until the frontier is empty
//!
//! # Invariants
//!
//! - The coordinator is the only writer of the visited set, so every
//!   `(identity, revision)` is processed at most once per run
//! - No two tasks of a run write the same folder or use the same simple name
//!   for different repositories; the first in frontier order wins
//! - A child is enqueued only while its parent has depth remaining
//! - Ignored targets are never entered, so nothing reachable only through
//!   them is cloned
//! - A root failure aborts the run and leaves no trees behind; any other
//!   failure is recorded and the run continues
//!
//! # Example
//!
//! ```ignore
//! use depforest::engine::{CloneOptions, GraphCloner};
//!
//! let cloner = GraphCloner::new(paths, ManifestReader::default());
//! let report = cloner.clone(uri, &revision, &CloneOptions::default()).await?;
//! println!("{} trees, {} failures", report.trees.len(), report.failures.len());
//! ```

mod claims;
pub mod report;
pub mod task;

pub use report::{
    BranchFailure, CloneReport, FailureKind, SkipReason, SkippedEdge, TreeKind, WorkingTree,
};
pub use task::{CloneTask, TaskError};

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::core::config::{Config, DEFAULT_FETCH_RETRIES, DEFAULT_WORKERS};
use crate::core::manifest::ManifestReader;
use crate::core::ops::{LockError, StoreLock};
use crate::core::paths::LayoutPaths;
use crate::core::types::{RepositoryIdentity, Revision, TypeError};
use crate::store::GitDirStore;
use claims::Claims;
use task::{TaskOutput, TaskPlan};

/// Global settings derived from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Debug logging enabled.
    pub debug: bool,
    /// Quiet mode (minimal output).
    pub quiet: bool,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
}

/// Options recognized by [`GraphCloner::clone`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// Dependency hops to follow from the root; 0 clones only the root
    pub depth_limit: u32,
    /// Identities never entered
    pub ignore_repos: HashSet<RepositoryIdentity>,
    /// Follow toolset edges too
    pub include_toolset: bool,
    /// Concurrent tasks per level
    pub workers: usize,
    /// Extra attempts for transport-class fetch failures
    pub fetch_retries: u32,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            depth_limit: u32::MAX,
            ignore_repos: HashSet::new(),
            include_toolset: false,
            workers: DEFAULT_WORKERS,
            fetch_retries: DEFAULT_FETCH_RETRIES,
        }
    }
}

impl CloneOptions {
    /// Options with defaults taken from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            depth_limit: config.depth(),
            ignore_repos: HashSet::new(),
            include_toolset: config.include_toolset(),
            workers: config.workers(),
            fetch_retries: config.fetch_retries(),
        }
    }
}

/// Errors that abort a whole clone run.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("invalid root repository: {0}")]
    InvalidRoot(#[from] TypeError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The root repository could not be cloned.
    #[error("root repository {identity} at {revision} failed: {source}")]
    RootFailed {
        identity: RepositoryIdentity,
        revision: Revision,
        #[source]
        source: TaskError,
    },

    /// A worker did not return.
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Shared by the coordinator and every worker.
#[derive(Debug)]
pub(crate) struct Shared {
    pub paths: LayoutPaths,
    pub store: GitDirStore,
    pub manifest: ManifestReader,
}

/// Clones a dependency graph into a repos folder backed by a shared
/// git-dir store.
#[derive(Debug)]
pub struct GraphCloner {
    shared: Arc<Shared>,
}

impl GraphCloner {
    /// Create a cloner for `paths`, reading manifests with `manifest`.
    pub fn new(paths: LayoutPaths, manifest: ManifestReader) -> Self {
        Self {
            shared: Arc::new(Shared {
                store: GitDirStore::new(paths.clone()),
                paths,
                manifest,
            }),
        }
    }

    /// The store backing this cloner.
    pub fn store(&self) -> &GitDirStore {
        &self.shared.store
    }

    /// Layout this cloner writes to.
    pub fn paths(&self) -> &LayoutPaths {
        &self.shared.paths
    }

    /// Clone `root_uri` at `root_revision` and everything it reaches.
    ///
    /// # Errors
    ///
    /// - [`CloneError::InvalidRoot`] if the root URI cannot be normalized
    /// - [`CloneError::Lock`] if another process holds the store
    /// - [`CloneError::RootFailed`] if the root itself cannot be cloned
    pub async fn clone(
        &self,
        root_uri: &str,
        root_revision: &Revision,
        options: &CloneOptions,
    ) -> Result<CloneReport, CloneError> {
        let root = CloneTask {
            identity: RepositoryIdentity::parse(root_uri)?,
            uri: root_uri.trim().to_string(),
            revision: root_revision.clone(),
            depth_remaining: options.depth_limit,
        };

        let _lock = StoreLock::acquire(&self.shared.paths)?;
        let repos_folder = &self.shared.paths.repos_folder;
        let created_repos_folder = !repos_folder.exists();
        fs::create_dir_all(repos_folder).map_err(|e| CloneError::Io {
            path: repos_folder.clone(),
            source: e,
        })?;

        let fetches_before = self.shared.store.fetch_count();
        info!(
            root = %root.identity,
            revision = %root.revision,
            depth = options.depth_limit,
            "starting clone"
        );

        let mut visited: HashSet<(RepositoryIdentity, Revision)> = HashSet::new();
        visited.insert(root.key());
        let mut mastered: HashSet<RepositoryIdentity> = HashSet::new();

        let mut root_tree = None;
        let mut trees = Vec::new();
        let mut edges = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();

        let mut claims = Claims::default();
        let mut frontier = vec![root];
        let mut level = 0usize;
        while !frontier.is_empty() {
            let mut plans = Vec::with_capacity(frontier.len());
            let mut blocked = Vec::with_capacity(frontier.len());
            for task in frontier {
                let wants_master = !mastered.contains(&task.identity);
                match claims.claim(&task, wants_master) {
                    Ok(()) => {
                        if wants_master {
                            mastered.insert(task.identity.clone());
                        }
                        plans.push(TaskPlan {
                            task,
                            create_master: wants_master,
                        });
                        blocked.push(None);
                    }
                    Err(error) => {
                        plans.push(TaskPlan {
                            task,
                            create_master: false,
                        });
                        blocked.push(Some(error));
                    }
                }
            }
            info!(level, tasks = plans.len(), "running level");

            let results = self.run_level(&plans, blocked, options).await?;

            // Identities whose master owner failed in this level.
            let mut orphaned: HashSet<RepositoryIdentity> = HashSet::new();
            let mut next = Vec::new();
            for (plan, result) in plans.into_iter().zip(results) {
                let output = match result {
                    Ok(output) => output,
                    Err(error) if level == 0 => {
                        if created_repos_folder {
                            let _ = fs::remove_dir(repos_folder);
                        }
                        return Err(CloneError::RootFailed {
                            identity: plan.task.identity,
                            revision: plan.task.revision,
                            source: error,
                        });
                    }
                    Err(error) => {
                        warn!(
                            identity = %plan.task.identity,
                            revision = %plan.task.revision,
                            error = %error,
                            "branch failed"
                        );
                        if plan.create_master {
                            orphaned.insert(plan.task.identity.clone());
                        }
                        failures.push(BranchFailure {
                            identity: plan.task.identity,
                            revision: plan.task.revision,
                            uri: plan.task.uri,
                            kind: error.kind(),
                            message: error.to_string(),
                        });
                        continue;
                    }
                };

                let TaskOutput {
                    trees: mut task_trees,
                    edges: task_edges,
                } = output;
                if orphaned.contains(&plan.task.identity) {
                    if let Some(master) = self.promote_master(&plan, &task_trees).await? {
                        orphaned.remove(&plan.task.identity);
                        task_trees.push(master);
                    }
                }
                if level == 0 {
                    root_tree = task_trees
                        .iter()
                        .find(|t| t.kind == TreeKind::Versioned)
                        .cloned();
                }
                trees.extend(task_trees);

                for edge in task_edges {
                    let reason = if options.ignore_repos.contains(&edge.target) {
                        Some(SkipReason::Ignored)
                    } else if edge.is_toolset && !options.include_toolset {
                        Some(SkipReason::Toolset)
                    } else if plan.task.depth_remaining == 0 {
                        Some(SkipReason::DepthExhausted)
                    } else {
                        None
                    };

                    match reason {
                        Some(reason) => skipped.push(SkippedEdge {
                            edge: edge.clone(),
                            reason,
                        }),
                        None => {
                            let child = plan.task.child(&edge);
                            if visited.insert(child.key()) {
                                next.push(child);
                            }
                        }
                    }
                    edges.push(edge);
                }
            }

            // No sibling took over; a later level may.
            for identity in orphaned {
                mastered.remove(&identity);
            }

            frontier = next;
            level += 1;
        }

        let root = root_tree.ok_or_else(|| CloneError::Worker("root produced no tree".into()))?;
        let report = CloneReport {
            root,
            trees,
            edges,
            skipped,
            failures,
            fetches: self.shared.store.fetch_count() - fetches_before,
        };
        info!(
            trees = report.trees.len(),
            failures = report.failures.len(),
            fetches = report.fetches,
            "clone finished"
        );
        Ok(report)
    }

    /// Give the master tree to a successful task whose identity lost its
    /// master owner in the same level. Returns `None` if that fails too.
    async fn promote_master(
        &self,
        plan: &TaskPlan,
        trees: &[WorkingTree],
    ) -> Result<Option<WorkingTree>, CloneError> {
        let versioned = match trees.iter().find(|t| t.kind == TreeKind::Versioned) {
            Some(tree) => tree.clone(),
            None => return Ok(None),
        };
        let shared = Arc::clone(&self.shared);
        let pending = plan.task.clone();
        let promoted = tokio::task::spawn_blocking(move || {
            task::promote_master(&shared, &pending, &versioned)
        })
        .await
        .map_err(|e| CloneError::Worker(e.to_string()))?;

        let identity = &plan.task.identity;
        match promoted {
            Ok(master) => {
                info!(identity = %identity, revision = %plan.task.revision, "master tree reassigned");
                Ok(Some(master))
            }
            Err(error) => {
                warn!(identity = %identity, error = %error, "failed to reassign master tree");
                Ok(None)
            }
        }
    }

    /// Run one frontier on the worker pool, returning results in frontier
    /// order. Tasks with a `blocked` error are not run and fail with it.
    async fn run_level(
        &self,
        plans: &[TaskPlan],
        blocked: Vec<Option<TaskError>>,
        options: &CloneOptions,
    ) -> Result<Vec<Result<TaskOutput, TaskError>>, CloneError> {
        let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
        let mut set = JoinSet::new();
        let mut slots: Vec<Option<Result<TaskOutput, TaskError>>> =
            blocked.into_iter().map(|b| b.map(Err)).collect();

        for (index, plan) in plans.iter().enumerate() {
            if slots[index].is_some() {
                continue;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| CloneError::Worker(e.to_string()))?;
            let shared = Arc::clone(&self.shared);
            let plan = plan.clone();
            let retries = options.fetch_retries;
            set.spawn_blocking(move || {
                let _permit = permit;
                (index, task::run(&shared, &plan, retries))
            });
        }

        while let Some(joined) = set.join_next().await {
            let (index, result) = joined.map_err(|e| CloneError::Worker(e.to_string()))?;
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| CloneError::Worker("task produced no result".into())))
            .collect()
    }
}
