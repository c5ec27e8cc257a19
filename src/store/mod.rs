//! store
//!
//! The shared git-dir store: one bare object directory per repository
//! identity, reused by every working tree of that repository and across runs.
//!
//! # Ownership
//!
//! The store owns every `<git_dir_folder>/<name>.git` entry. Working trees
//! only point at their entry through a redirect record. Each acquisition
//! counts as a reference; an entry is deleted only through an explicit
//! [`GitDirStore::remove`] once nothing references it.
//!
//! # Concurrency
//!
//! - Acquisition is serialized store-wide, so at most one caller ever
//!   initializes a given entry.
//! - Fetching, resolving and attaching are serialized per entry. Distinct
//!   entries proceed in parallel.
//!
//! # Example
//!
//! ```ignore
//! use depforest::store::GitDirStore;
//!
//! let store = GitDirStore::new(paths);
//! let handle = store.acquire(&identity, "https://github.com/org/tool")?;
//! let commit = store.ensure_revision(&handle, &revision, 2)?;
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::paths::LayoutPaths;
use crate::core::types::{Oid, RepositoryIdentity, Revision};
use crate::git::{Git, GitError};

/// Errors from fetching a revision into the store.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-class failure. Retrying may help.
    #[error("transport failure fetching {identity}: {message}")]
    Transport {
        identity: RepositoryIdentity,
        message: String,
    },

    /// The remote refused the fetch (authentication, missing repository).
    #[error("remote rejected fetch of {identity}: {message}")]
    Remote {
        identity: RepositoryIdentity,
        message: String,
    },

    /// The fetch succeeded but the revision does not exist upstream.
    #[error("revision '{revision}' not found in {identity}")]
    UnknownRevision {
        identity: RepositoryIdentity,
        revision: Revision,
    },
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }
}

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Two distinct identities want the same `<name>.git` entry.
    #[error("name collision on '{name}': {existing} already owns it, {requested} cannot share it")]
    NameCollision {
        name: String,
        existing: String,
        requested: RepositoryIdentity,
    },

    /// The entry is still referenced.
    #[error("store entry for {identity} is still referenced ({refs} references)")]
    InUse {
        identity: RepositoryIdentity,
        refs: usize,
    },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("store i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A reference to one store entry.
///
/// Handles are not released on drop. A working tree keeps its entry
/// referenced for the lifetime of the store; call
/// [`GitDirStore::release`] to give a reference back.
#[derive(Debug)]
pub struct GitDirHandle {
    /// Identity the entry belongs to
    pub identity: RepositoryIdentity,
    /// Path of the bare entry
    pub path: PathBuf,
    /// Whether this acquisition initialized the entry
    pub created: bool,
    slot: Arc<Slot>,
}

#[derive(Debug)]
struct Slot {
    uri: String,
    path: PathBuf,
    refs: AtomicUsize,
    /// Whether this process initialized the entry
    created: bool,
    /// Serializes fetch, resolve and attach on the entry
    busy: Mutex<()>,
}

#[derive(Debug, Default)]
struct Registry {
    slots: HashMap<RepositoryIdentity, Arc<Slot>>,
    names: HashMap<String, RepositoryIdentity>,
}

/// The shared pool of bare git directories.
#[derive(Debug)]
pub struct GitDirStore {
    paths: LayoutPaths,
    registry: Mutex<Registry>,
    fetches: AtomicUsize,
}

impl GitDirStore {
    /// Create a store rooted at `paths.git_dir_folder`.
    pub fn new(paths: LayoutPaths) -> Self {
        Self {
            paths,
            registry: Mutex::new(Registry::default()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Layout this store was created with.
    pub fn paths(&self) -> &LayoutPaths {
        &self.paths
    }

    /// Number of network fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the entry for `identity`, creating an empty one if needed.
    ///
    /// An entry already on disk is reused when its origin normalizes to
    /// `identity`. Every call takes one reference.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NameCollision`] if a different identity already owns
    ///   `<name>.git`, in this run or on disk
    pub fn acquire(
        &self,
        identity: &RepositoryIdentity,
        uri: &str,
    ) -> Result<GitDirHandle, StoreError> {
        let mut registry = self.registry();
        let name = identity.name().to_string();

        if let Some(owner) = registry.names.get(&name) {
            if owner != identity {
                return Err(StoreError::NameCollision {
                    name,
                    existing: owner.to_string(),
                    requested: identity.clone(),
                });
            }
        }

        if let Some(slot) = registry.slots.get(identity) {
            slot.refs.fetch_add(1, Ordering::SeqCst);
            return Ok(GitDirHandle {
                identity: identity.clone(),
                path: slot.path.clone(),
                created: false,
                slot: Arc::clone(slot),
            });
        }

        let path = self.paths.git_dir(&name);
        let created = if path.exists() {
            self.adopt_existing(&path, identity, uri)?;
            false
        } else {
            fs::create_dir_all(&self.paths.git_dir_folder).map_err(|e| StoreError::Io {
                path: self.paths.git_dir_folder.clone(),
                source: e,
            })?;
            Git::init_store(&path, uri)?;
            info!(identity = %identity, path = %path.display(), "initialized store entry");
            true
        };

        let slot = Arc::new(Slot {
            uri: uri.to_string(),
            path: path.clone(),
            refs: AtomicUsize::new(1),
            created,
            busy: Mutex::new(()),
        });
        registry.slots.insert(identity.clone(), Arc::clone(&slot));
        registry.names.insert(name, identity.clone());

        Ok(GitDirHandle {
            identity: identity.clone(),
            path,
            created,
            slot,
        })
    }

    /// Check that an on-disk entry belongs to `identity` before reusing it.
    fn adopt_existing(
        &self,
        path: &Path,
        identity: &RepositoryIdentity,
        uri: &str,
    ) -> Result<(), StoreError> {
        let git = Git::open_store(path)?;
        match git.origin_url()? {
            Some(origin) => {
                let owner = RepositoryIdentity::parse(&origin).ok();
                if owner.as_ref() != Some(identity) {
                    return Err(StoreError::NameCollision {
                        name: identity.name().to_string(),
                        existing: origin,
                        requested: identity.clone(),
                    });
                }
                git.ensure_origin(uri)?;
            }
            None => git.ensure_origin(uri)?,
        }
        debug!(identity = %identity, path = %path.display(), "reusing store entry");
        Ok(())
    }

    /// Fetch from origin once and resolve `revision`.
    ///
    /// Performs exactly one network fetch. Retrying is the caller's call.
    pub fn fetch(&self, handle: &GitDirHandle, revision: &Revision) -> Result<Oid, StoreError> {
        let _busy = lock_busy(&handle.slot);
        let git = Git::open_store(&handle.path)?;
        self.fetch_locked(&git, handle, revision)
    }

    fn fetch_locked(
        &self,
        git: &Git,
        handle: &GitDirHandle,
        revision: &Revision,
    ) -> Result<Oid, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        debug!(identity = %handle.identity, revision = %revision, uri = %handle.slot.uri, "fetch");

        git.fetch_origin().map_err(|e| match e {
            GitError::Transport { message } => StoreError::Fetch(FetchError::Transport {
                identity: handle.identity.clone(),
                message,
            }),
            GitError::Remote { message } => StoreError::Fetch(FetchError::Remote {
                identity: handle.identity.clone(),
                message,
            }),
            other => StoreError::Git(other),
        })?;

        git.resolve_commit(revision.as_str())?.ok_or_else(|| {
            StoreError::Fetch(FetchError::UnknownRevision {
                identity: handle.identity.clone(),
                revision: revision.clone(),
            })
        })
    }

    /// Make `revision` available in the entry and resolve it to a commit.
    ///
    /// A revision that already resolves locally is not fetched again.
    /// Transport failures are retried up to `retries` more times; unknown
    /// revisions and remote rejections are not.
    pub fn ensure_revision(
        &self,
        handle: &GitDirHandle,
        revision: &Revision,
        retries: u32,
    ) -> Result<Oid, StoreError> {
        let _busy = lock_busy(&handle.slot);
        let git = Git::open_store(&handle.path)?;

        if let Some(commit) = git.resolve_commit(revision.as_str())? {
            debug!(identity = %handle.identity, revision = %revision, "revision already local");
            return Ok(commit);
        }

        let mut attempt = 0;
        loop {
            match self.fetch_locked(&git, handle, revision) {
                Err(StoreError::Fetch(e)) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(identity = %handle.identity, attempt, error = %e, "retrying fetch");
                }
                result => return result,
            }
        }
    }

    /// Point the entry's `HEAD`, index and work tree at a master tree.
    pub fn attach_master(
        &self,
        handle: &GitDirHandle,
        commit: &Oid,
        master: &Path,
    ) -> Result<(), StoreError> {
        let _busy = lock_busy(&handle.slot);
        Git::open_store(&handle.path)?.attach_worktree(commit, master)?;
        Ok(())
    }

    /// Number of live references to the entry for `identity`.
    pub fn references(&self, identity: &RepositoryIdentity) -> usize {
        self.registry()
            .slots
            .get(identity)
            .map(|slot| slot.refs.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Give back one reference.
    pub fn release(&self, handle: GitDirHandle) {
        let _ = handle
            .slot
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Release `handle` and delete the entry if this process created it and
    /// nothing else references it.
    ///
    /// Used when a branch fails so it leaves no half-initialized entry.
    pub fn discard(&self, handle: GitDirHandle) -> Result<bool, StoreError> {
        let identity = handle.identity.clone();
        let created = handle.slot.created;
        self.release(handle);
        if !created {
            return Ok(false);
        }
        match self.remove(&identity) {
            Ok(removed) => Ok(removed),
            Err(StoreError::InUse { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete the entry for `identity` from disk.
    ///
    /// Returns `false` if there is nothing to delete.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InUse`] if the entry is still referenced
    /// - [`StoreError::NameCollision`] if `<name>.git` belongs to another
    ///   identity
    pub fn remove(&self, identity: &RepositoryIdentity) -> Result<bool, StoreError> {
        let mut registry = self.registry();

        let path = match registry.slots.get(identity) {
            Some(slot) => {
                let refs = slot.refs.load(Ordering::SeqCst);
                if refs > 0 {
                    return Err(StoreError::InUse {
                        identity: identity.clone(),
                        refs,
                    });
                }
                slot.path.clone()
            }
            None => {
                let path = self.paths.git_dir(identity.name());
                if !path.exists() {
                    return Ok(false);
                }
                let origin = Git::open_store(&path)?.origin_url()?;
                let owner = origin.as_deref().and_then(|o| RepositoryIdentity::parse(o).ok());
                if owner.as_ref() != Some(identity) {
                    return Err(StoreError::NameCollision {
                        name: identity.name().to_string(),
                        existing: origin.unwrap_or_default(),
                        requested: identity.clone(),
                    });
                }
                path
            }
        };

        registry.slots.remove(identity);
        if registry.names.get(identity.name()) == Some(identity) {
            registry.names.remove(identity.name());
        }

        fs::remove_dir_all(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        info!(identity = %identity, path = %path.display(), "removed store entry");
        Ok(true)
    }
}

fn lock_busy(slot: &Slot) -> MutexGuard<'_, ()> {
    slot.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .expect("git runs");
        assert!(status.success(), "git {:?} failed", args);
    }

    /// A source repository with one commit on `main`.
    fn remote(root: &Path, name: &str) -> PathBuf {
        let dir = root.join("remotes").join(name);
        fs::create_dir_all(&dir).unwrap();
        run_git(&dir, &["init", "-q"]);
        run_git(&dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(dir.join("README"), name).unwrap();
        run_git(&dir, &["add", "."]);
        run_git(&dir, &["commit", "-q", "-m", "init"]);
        dir
    }

    fn setup() -> (TempDir, GitDirStore) {
        let temp = TempDir::new().unwrap();
        let paths = LayoutPaths::new(temp.path().join("repos"), temp.path().join("gitdirs"));
        (temp, GitDirStore::new(paths))
    }

    fn identity(path: &Path) -> RepositoryIdentity {
        RepositoryIdentity::parse(&path.display().to_string()).unwrap()
    }

    mod acquire {
        use super::*;

        #[test]
        fn creates_then_reuses() {
            let (temp, store) = setup();
            let uri = remote(temp.path(), "tool").display().to_string();
            let id = identity(Path::new(&uri));

            let first = store.acquire(&id, &uri).unwrap();
            assert!(first.created);
            assert!(first.path.ends_with("tool.git"));

            let second = store.acquire(&id, &uri).unwrap();
            assert!(!second.created);
            assert_eq!(first.path, second.path);
            assert_eq!(store.references(&id), 2);
        }

        #[test]
        fn same_name_different_identity_collides() {
            let (temp, store) = setup();
            let a = remote(&temp.path().join("a"), "tool");
            let b = remote(&temp.path().join("b"), "tool");

            store.acquire(&identity(&a), &a.display().to_string()).unwrap();
            let result = store.acquire(&identity(&b), &b.display().to_string());
            assert!(matches!(result, Err(StoreError::NameCollision { .. })));
        }

        #[test]
        fn collision_detected_across_runs() {
            let (temp, store) = setup();
            let a = remote(&temp.path().join("a"), "tool");
            let b = remote(&temp.path().join("b"), "tool");
            store.acquire(&identity(&a), &a.display().to_string()).unwrap();

            let fresh = GitDirStore::new(store.paths().clone());
            let result = fresh.acquire(&identity(&b), &b.display().to_string());
            assert!(matches!(result, Err(StoreError::NameCollision { .. })));

            let reused = fresh.acquire(&identity(&a), &a.display().to_string()).unwrap();
            assert!(!reused.created);
        }
    }

    mod revisions {
        use super::*;

        #[test]
        fn second_ensure_does_not_fetch() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let uri = dir.display().to_string();
            let handle = store.acquire(&identity(&dir), &uri).unwrap();
            let main = Revision::new("main").unwrap();

            let first = store.ensure_revision(&handle, &main, 0).unwrap();
            assert_eq!(store.fetch_count(), 1);
            let second = store.ensure_revision(&handle, &main, 0).unwrap();
            assert_eq!(store.fetch_count(), 1);
            assert_eq!(first, second);
            assert!(handle.path.join("FETCH_HEAD").is_file());
        }

        #[test]
        fn fetch_always_fetches() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let handle = store.acquire(&identity(&dir), &dir.display().to_string()).unwrap();
            let main = Revision::new("main").unwrap();

            store.fetch(&handle, &main).unwrap();
            store.fetch(&handle, &main).unwrap();
            assert_eq!(store.fetch_count(), 2);
        }

        #[test]
        fn unknown_revision_is_not_retried() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let handle = store.acquire(&identity(&dir), &dir.display().to_string()).unwrap();
            let missing = Revision::new("no-such-branch").unwrap();

            let result = store.ensure_revision(&handle, &missing, 3);
            assert!(matches!(
                result,
                Err(StoreError::Fetch(FetchError::UnknownRevision { .. }))
            ));
            assert_eq!(store.fetch_count(), 1);
        }

        #[test]
        fn unreachable_remote_fails() {
            let (temp, store) = setup();
            let missing = temp.path().join("remotes/ghost");
            let handle = store
                .acquire(&identity(&missing), &missing.display().to_string())
                .unwrap();

            let result = store.ensure_revision(&handle, &Revision::new("main").unwrap(), 1);
            assert!(result.is_err());
            assert!(store.fetch_count() >= 1);
        }
    }

    mod removal {
        use super::*;

        #[test]
        fn remove_refuses_while_referenced() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let id = identity(&dir);
            let handle = store.acquire(&id, &dir.display().to_string()).unwrap();

            assert!(matches!(store.remove(&id), Err(StoreError::InUse { refs: 1, .. })));

            let path = handle.path.clone();
            store.release(handle);
            assert!(store.remove(&id).unwrap());
            assert!(!path.exists());
        }

        #[test]
        fn remove_unknown_is_noop() {
            let (_temp, store) = setup();
            let id = RepositoryIdentity::parse("https://example.com/none").unwrap();
            assert!(!store.remove(&id).unwrap());
        }

        #[test]
        fn discard_deletes_fresh_unreferenced_entry() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let handle = store.acquire(&identity(&dir), &dir.display().to_string()).unwrap();
            let path = handle.path.clone();

            assert!(store.discard(handle).unwrap());
            assert!(!path.exists());
        }

        #[test]
        fn discard_keeps_shared_entry() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let id = identity(&dir);
            let first = store.acquire(&id, &dir.display().to_string()).unwrap();
            let _second = store.acquire(&id, &dir.display().to_string()).unwrap();
            let path = first.path.clone();

            assert!(!store.discard(first).unwrap());
            assert!(path.exists());
            assert_eq!(store.references(&id), 1);
        }

        #[test]
        fn discard_keeps_preexisting_entry() {
            let (temp, store) = setup();
            let dir = remote(temp.path(), "tool");
            let id = identity(&dir);
            store.acquire(&id, &dir.display().to_string()).unwrap();

            let fresh = GitDirStore::new(store.paths().clone());
            let handle = fresh.acquire(&id, &dir.display().to_string()).unwrap();
            let path = handle.path.clone();
            assert!(!fresh.discard(handle).unwrap());
            assert!(path.exists());
        }
    }
}
