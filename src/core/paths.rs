//! core::paths
//!
//! Centralized path routing for the clone layout.
//!
//! # Layout
//!
//! For a repository whose simple name is `n`:
//! - `<git_dir_folder>/n.git` - shared git-dir store entry
//! - `<repos_folder>/n` - master working tree
//! - `<repos_folder>/n.<revision>` - versioned working tree
//! - `<working tree>/.git` - redirect record `gitdir: <git_dir_folder>/n.git`
//! - `<git_dir_folder>/.depforest.lock` - store lock file
//!
//! **Hard rule:** No code outside this module joins layout paths by hand.
//!
//! # Example
//!
//! ```
//! use depforest::core::paths::LayoutPaths;
//! use depforest::core::types::Revision;
//! use std::path::PathBuf;
//!
//! let paths = LayoutPaths::new(PathBuf::from("/work/repos"), PathBuf::from("/work/gitdirs"));
//! let rev = Revision::new("release/1.0").unwrap();
//!
//! assert_eq!(paths.git_dir("arcade"), PathBuf::from("/work/gitdirs/arcade.git"));
//! assert_eq!(paths.master_dir("arcade"), PathBuf::from("/work/repos/arcade"));
//! assert_eq!(
//!     paths.versioned_dir("arcade", &rev),
//!     PathBuf::from("/work/repos/arcade.release-1.0")
//! );
//! assert_eq!(
//!     paths.redirect_line("arcade"),
//!     "gitdir: /work/gitdirs/arcade.git"
//! );
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::core::types::Revision;

/// File name of the redirect record inside every working tree.
pub const REDIRECT_FILE: &str = ".git";

/// Prefix of the redirect record line.
pub const REDIRECT_PREFIX: &str = "gitdir: ";

/// File name of the cross-process store lock.
pub const LOCK_FILE: &str = ".depforest.lock";

/// Centralized path routing for a clone run.
///
/// # Invariants
///
/// - Both folders are absolute once built through [`LayoutPaths::resolve`]
/// - Git-dir entries are always `<name>.git`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPaths {
    /// Folder that receives master and versioned working trees.
    pub repos_folder: PathBuf,

    /// Folder that holds the shared git-dir store.
    pub git_dir_folder: PathBuf,
}

impl LayoutPaths {
    /// Create from two folders, used as given.
    pub fn new(repos_folder: PathBuf, git_dir_folder: PathBuf) -> Self {
        Self {
            repos_folder,
            git_dir_folder,
        }
    }

    /// Create from two folders, making both absolute.
    ///
    /// Relative paths are resolved once here; nothing downstream consults
    /// the process working directory.
    pub fn resolve(repos_folder: &Path, git_dir_folder: &Path) -> io::Result<Self> {
        Ok(Self {
            repos_folder: std::path::absolute(repos_folder)?,
            git_dir_folder: std::path::absolute(git_dir_folder)?,
        })
    }

    // =========================================================================
    // Store paths
    // =========================================================================

    /// Folder name of a store entry (`<name>.git`).
    pub fn git_dir_name(name: &str) -> String {
        format!("{}.git", name)
    }

    /// Path of the store entry for `name`.
    pub fn git_dir(&self, name: &str) -> PathBuf {
        self.git_dir_folder.join(Self::git_dir_name(name))
    }

    /// Path of the store lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.git_dir_folder.join(LOCK_FILE)
    }

    // =========================================================================
    // Working tree paths
    // =========================================================================

    /// Folder name of a versioned working tree (`<name>.<revision>`).
    pub fn versioned_name(name: &str, revision: &Revision) -> String {
        format!("{}.{}", name, revision.dir_component())
    }

    /// Path of the master working tree for `name`.
    pub fn master_dir(&self, name: &str) -> PathBuf {
        self.repos_folder.join(name)
    }

    /// Path of the versioned working tree for `name` at `revision`.
    pub fn versioned_dir(&self, name: &str, revision: &Revision) -> PathBuf {
        self.repos_folder.join(Self::versioned_name(name, revision))
    }

    /// Path of the redirect record inside a working tree.
    pub fn redirect_path(tree: &Path) -> PathBuf {
        tree.join(REDIRECT_FILE)
    }

    /// The exact redirect line a working tree of `name` must carry.
    pub fn redirect_line(&self, name: &str) -> String {
        format!("{}{}", REDIRECT_PREFIX, self.git_dir(name).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> LayoutPaths {
        LayoutPaths::new(PathBuf::from("/r"), PathBuf::from("/g"))
    }

    #[test]
    fn store_paths() {
        let p = paths();
        assert_eq!(p.git_dir("tool"), PathBuf::from("/g/tool.git"));
        assert_eq!(p.lock_path(), PathBuf::from("/g/.depforest.lock"));
        assert_eq!(LayoutPaths::git_dir_name("tool"), "tool.git");
    }

    #[test]
    fn working_tree_paths() {
        let p = paths();
        let rev = Revision::new("abc123").unwrap();
        assert_eq!(p.master_dir("tool"), PathBuf::from("/r/tool"));
        assert_eq!(p.versioned_dir("tool", &rev), PathBuf::from("/r/tool.abc123"));
        assert_eq!(
            LayoutPaths::redirect_path(&p.master_dir("tool")),
            PathBuf::from("/r/tool/.git")
        );
    }

    #[test]
    fn redirect_line_format() {
        assert_eq!(paths().redirect_line("tool"), "gitdir: /g/tool.git");
    }

    #[test]
    fn resolve_makes_absolute() {
        let p = LayoutPaths::resolve(Path::new("repos"), Path::new("gitdirs")).unwrap();
        assert!(p.repos_folder.is_absolute());
        assert!(p.git_dir_folder.is_absolute());
        assert!(p.repos_folder.ends_with("repos"));
    }
}
