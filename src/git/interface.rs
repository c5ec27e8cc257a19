//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to all Git operations in
//! depforest. Every store initialization, fetch, revision lookup and tree
//! materialization flows through [`Git`], which returns strong types and
//! normalizes errors into typed failure categories.
//!
//! # Architecture
//!
//! `Git` wraps a bare git-dir store entry. Working trees never get their own
//! object database; they are written file by file from the store and point
//! back at it through a redirect record (see [`write_redirect`]).
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Path is not a git directory
//! - [`GitError::Transport`]: Network-class failure, worth retrying
//! - [`GitError::Remote`]: The remote rejected the request (auth, missing repo)
//! - [`GitError::ObjectNotFound`]: Requested object does not exist
//!
//! # Example
//!
//! ```ignore
//! use depforest::git::Git;
//!
//! let git = Git::init_store(&store_path, "https://github.com/org/tool")?;
//! git.fetch_origin()?;
//! let commit = git.resolve_commit("main")?.expect("fetched");
//! git.materialize(&commit, &tree_path)?;
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::core::paths::{REDIRECT_FILE, REDIRECT_PREFIX};
use crate::core::types::{Oid, TypeError};

/// Name of the remote every store entry fetches from.
pub const ORIGIN: &str = "origin";

/// Refspecs fetched into a store entry.
const FETCH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/remotes/origin/*", "+refs/tags/*:refs/tags/*"];

/// Directories every populated store entry contains.
pub const STORE_DIRS: [&str; 5] = ["hooks", "info", "logs", "objects", "refs"];

/// Files every populated store entry contains.
pub const STORE_FILES: [&str; 5] = ["config", "description", "FETCH_HEAD", "HEAD", "index"];

const DEFAULT_DESCRIPTION: &str =
    "Unnamed repository; edit this file 'description' to name the repository.\n";

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Path is not a git directory.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Network-class failure talking to the remote.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// The remote refused the request.
    #[error("remote error: {message}")]
    Remote {
        /// Description of the failure
        message: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// A tree entry that cannot be written safely.
    #[error("refusing to write tree entry '{name}'")]
    UnsafeEntry {
        /// The entry name as stored
        name: String,
    },

    /// Permission or locking error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Filesystem error while writing a working tree.
    #[error("failed to write {path}: {source}")]
    Io {
        /// The path being written
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::ObjectNotFound {
                oid: context.to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    /// Classify a failed fetch.
    fn from_fetch(err: git2::Error) -> Self {
        let message = err.message().to_string();
        if matches!(
            err.code(),
            git2::ErrorCode::Auth | git2::ErrorCode::Certificate
        ) {
            return GitError::Remote { message };
        }
        match err.class() {
            git2::ErrorClass::Net
            | git2::ErrorClass::Http
            | git2::ErrorClass::Ssh
            | git2::ErrorClass::Ssl
            | git2::ErrorClass::Os => GitError::Transport { message },
            _ => GitError::Remote { message },
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        GitError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::ObjectNotFound {
                oid: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            other => GitError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// A git-dir store entry.
///
/// This is the **single point of interaction** with Git. No other module
/// should import `git2` directly.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Store Entries
    // =========================================================================

    /// Initialize a new bare store entry at `path` fetching from `url`.
    ///
    /// Reflogs are enabled so the entry carries a `logs` directory like a
    /// regular clone.
    pub fn init_store(path: &Path, url: &str) -> Result<Self, GitError> {
        let repo = git2::Repository::init_bare(path)
            .map_err(|e| GitError::from_git2(e, &path.display().to_string()))?;

        repo.config()?.set_bool("core.logallrefupdates", true)?;
        repo.remote(ORIGIN, url)
            .map_err(|e| GitError::from_git2(e, ORIGIN))?;

        let git = Self { repo };
        git.ensure_layout()?;
        Ok(git)
    }

    /// Open an existing store entry.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not a git directory
    pub fn open_store(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open_bare(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Path of the git directory.
    pub fn path(&self) -> &Path {
        self.repo.path()
    }

    /// Create any of the standard directories and files a store entry is
    /// missing.
    fn ensure_layout(&self) -> Result<(), GitError> {
        let root = self.repo.path();
        for dir in STORE_DIRS {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| GitError::io(&path, e))?;
        }
        let description = root.join("description");
        if !description.exists() {
            fs::write(&description, DEFAULT_DESCRIPTION)
                .map_err(|e| GitError::io(&description, e))?;
        }
        Ok(())
    }

    // =========================================================================
    // Remotes
    // =========================================================================

    /// Get the URL of the origin remote.
    ///
    /// Returns `None` if the remote doesn't exist.
    pub fn origin_url(&self) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(ORIGIN) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, ORIGIN)),
        }
    }

    /// Point origin at `url`, creating the remote if needed.
    pub fn ensure_origin(&self, url: &str) -> Result<(), GitError> {
        match self.origin_url()? {
            Some(existing) if existing == url => Ok(()),
            Some(_) => self
                .repo
                .remote_set_url(ORIGIN, url)
                .map_err(|e| GitError::from_git2(e, ORIGIN)),
            None => self
                .repo
                .remote(ORIGIN, url)
                .map(|_| ())
                .map_err(|e| GitError::from_git2(e, ORIGIN)),
        }
    }

    /// Fetch all branches and tags from origin.
    ///
    /// Branches land under `refs/remotes/origin/*`, tags under `refs/tags/*`
    /// and `FETCH_HEAD` is rewritten.
    ///
    /// # Errors
    ///
    /// - [`GitError::Transport`] for network-class failures
    /// - [`GitError::Remote`] when the remote refuses the request
    pub fn fetch_origin(&self) -> Result<(), GitError> {
        let mut remote = self
            .repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::from_git2(e, ORIGIN))?;

        let mut options = git2::FetchOptions::new();
        options.download_tags(git2::AutotagOption::All);

        debug!(store = %self.repo.path().display(), url = ?remote.url(), "fetching origin");
        remote
            .fetch(&FETCH_REFSPECS, Some(&mut options), Some("depforest: fetch"))
            .map_err(GitError::from_fetch)
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    /// Resolve a revision to a commit already present in the store.
    ///
    /// Tries the revision as written (SHA, tag, full ref), then as a branch
    /// of origin. Returns `None` when nothing local matches.
    pub fn resolve_commit(&self, revision: &str) -> Result<Option<Oid>, GitError> {
        let candidates = [
            revision.to_string(),
            format!("refs/remotes/{}/{}", ORIGIN, revision),
        ];

        for spec in &candidates {
            let object = match self.repo.revparse_single(spec) {
                Ok(object) => object,
                Err(e)
                    if matches!(
                        e.code(),
                        git2::ErrorCode::NotFound
                            | git2::ErrorCode::InvalidSpec
                            | git2::ErrorCode::Ambiguous
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(GitError::from_git2(e, spec)),
            };
            let commit = object
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, spec))?;
            return Ok(Some(from_git2_oid(commit.id())?));
        }

        Ok(None)
    }

    /// The commit `HEAD` points at, or `None` while it is unborn.
    pub fn head_commit(&self) -> Result<Option<Oid>, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        let commit = head
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        Ok(Some(from_git2_oid(commit.id())?))
    }

    // =========================================================================
    // Working Trees
    // =========================================================================

    /// Write the files of `commit` into `dest`.
    ///
    /// `dest` is created if needed. Entries named `.git` are never written,
    /// submodules become empty directories, and on Unix executable bits and
    /// symlinks are preserved.
    pub fn materialize(&self, commit: &Oid, dest: &Path) -> Result<(), GitError> {
        let tree = self
            .repo
            .find_commit(to_git2_oid(commit)?)
            .and_then(|c| c.tree())
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        self.write_tree(&tree, dest)
    }

    fn write_tree(&self, tree: &git2::Tree<'_>, dir: &Path) -> Result<(), GitError> {
        fs::create_dir_all(dir).map_err(|e| GitError::io(dir, e))?;

        for entry in tree.iter() {
            let name = entry_name(&entry)?;
            if name.as_os_str() == REDIRECT_FILE {
                continue;
            }
            let dest = dir.join(&name);

            match entry.kind() {
                Some(git2::ObjectType::Tree) => {
                    let subtree = self
                        .repo
                        .find_tree(entry.id())
                        .map_err(|e| GitError::from_git2(e, &entry.id().to_string()))?;
                    self.write_tree(&subtree, &dest)?;
                }
                Some(git2::ObjectType::Blob) => self.write_blob(&entry, &dest)?,
                Some(git2::ObjectType::Commit) => {
                    fs::create_dir_all(&dest).map_err(|e| GitError::io(&dest, e))?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn write_blob(&self, entry: &git2::TreeEntry<'_>, dest: &Path) -> Result<(), GitError> {
        let blob = self
            .repo
            .find_blob(entry.id())
            .map_err(|e| GitError::from_git2(e, &entry.id().to_string()))?;

        #[cfg(unix)]
        if entry.filemode() == 0o120000 {
            use std::os::unix::ffi::OsStrExt;
            let target = std::ffi::OsStr::from_bytes(blob.content());
            return std::os::unix::fs::symlink(target, dest).map_err(|e| GitError::io(dest, e));
        }

        fs::write(dest, blob.content()).map_err(|e| GitError::io(dest, e))?;

        #[cfg(unix)]
        if entry.filemode() == 0o100755 {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dest, fs::Permissions::from_mode(0o755))
                .map_err(|e| GitError::io(dest, e))?;
        }

        Ok(())
    }

    /// Whether every file of `commit` is present in `dir` with the same
    /// content. Files `commit` does not have are not considered.
    pub fn tree_matches(&self, commit: &Oid, dir: &Path) -> Result<bool, GitError> {
        let tree = self
            .repo
            .find_commit(to_git2_oid(commit)?)
            .and_then(|c| c.tree())
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        self.compare_tree(&tree, dir)
    }

    fn compare_tree(&self, tree: &git2::Tree<'_>, dir: &Path) -> Result<bool, GitError> {
        for entry in tree.iter() {
            let name = entry_name(&entry)?;
            if name.as_os_str() == REDIRECT_FILE {
                continue;
            }
            let path = dir.join(&name);

            let same = match entry.kind() {
                Some(git2::ObjectType::Tree) => {
                    let subtree = self
                        .repo
                        .find_tree(entry.id())
                        .map_err(|e| GitError::from_git2(e, &entry.id().to_string()))?;
                    path.is_dir() && self.compare_tree(&subtree, &path)?
                }
                Some(git2::ObjectType::Blob) => self.blob_matches(&entry, &path)?,
                Some(git2::ObjectType::Commit) => path.is_dir(),
                _ => true,
            };
            if !same {
                debug!(path = %path.display(), "working tree differs from commit");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn blob_matches(&self, entry: &git2::TreeEntry<'_>, path: &Path) -> Result<bool, GitError> {
        let blob = self
            .repo
            .find_blob(entry.id())
            .map_err(|e| GitError::from_git2(e, &entry.id().to_string()))?;

        #[cfg(unix)]
        if entry.filemode() == 0o120000 {
            use std::os::unix::ffi::OsStrExt;
            return Ok(fs::read_link(path)
                .map(|target| target.as_os_str().as_bytes() == blob.content())
                .unwrap_or(false));
        }

        if path.is_dir() {
            return Ok(false);
        }
        match fs::read(path) {
            Ok(bytes) => Ok(bytes == blob.content()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GitError::io(path, e)),
        }
    }

    /// Make this store entry the git directory of the master tree at
    /// `worktree`.
    ///
    /// Sets `core.bare = false` and `core.worktree`, detaches `HEAD` at
    /// `commit` and writes an index matching its tree, so `git status` in the
    /// master tree reports it clean.
    pub fn attach_worktree(&self, commit: &Oid, worktree: &Path) -> Result<(), GitError> {
        let worktree_str = worktree.to_str().ok_or_else(|| GitError::Internal {
            message: format!("worktree path is not UTF-8: {}", worktree.display()),
        })?;

        let mut config = self.repo.config()?;
        config.set_bool("core.bare", false)?;
        config.set_str("core.worktree", worktree_str)?;

        // Reopen so the index is bound to the now non-bare repository.
        let repo = git2::Repository::open(self.repo.path()).map_err(|_| GitError::NotARepo {
            path: self.repo.path().to_path_buf(),
        })?;

        let oid = to_git2_oid(commit)?;
        repo.set_head_detached(oid)
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        let tree = repo
            .find_commit(oid)
            .and_then(|c| c.tree())
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        let mut index = repo.index()?;
        index.read_tree(&tree)?;
        index.write()?;

        Ok(())
    }
}

/// Write the redirect record `gitdir: <git_dir>` into `tree`.
pub fn write_redirect(tree: &Path, git_dir: &Path) -> Result<(), GitError> {
    let path = tree.join(REDIRECT_FILE);
    let line = format!("{}{}\n", REDIRECT_PREFIX, git_dir.display());
    fs::write(&path, line).map_err(|e| GitError::io(&path, e))
}

/// Read the target recorded in the redirect record of `tree`.
///
/// Returns `None` when `tree` has no `.git` file (a missing record, or a
/// `.git` directory from an ordinary clone) or the record does not start
/// with `gitdir: `.
pub fn read_redirect(tree: &Path) -> io::Result<Option<String>> {
    let path = tree.join(REDIRECT_FILE);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }

    let contents = fs::read_to_string(&path)?;
    Ok(contents
        .lines()
        .next()
        .and_then(|line| line.strip_prefix(REDIRECT_PREFIX))
        .map(|target| target.trim_end().to_string()))
}

fn entry_name(entry: &git2::TreeEntry<'_>) -> Result<PathBuf, GitError> {
    let bytes = entry.name_bytes();
    let unsafe_name = bytes.is_empty()
        || bytes == b"."
        || bytes == b".."
        || bytes.contains(&b'/')
        || bytes.contains(&b'\\')
        || bytes.contains(&0);
    if unsafe_name {
        return Err(GitError::UnsafeEntry {
            name: String::from_utf8_lossy(bytes).into_owned(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Ok(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
    }
    #[cfg(not(unix))]
    {
        Ok(PathBuf::from(String::from_utf8_lossy(bytes).into_owned()))
    }
}

fn to_git2_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn from_git2_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(GitError::from)
}
