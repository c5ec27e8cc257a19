//! core::verify
//!
//! Read-only verification of a cloned forest against an expected layout.
//!
//! # Checks
//!
//! - Every repo in `repo_hashes` exists; its manifest hashes to the expected
//!   digest, or is absent when the expected digest is empty
//! - Every master repo exists and redirects to `<git_dir_folder>/<name>.git`
//!   (case-insensitive)
//! - Every expected git dir exists with the standard bare layout
//! - Nothing else exists in either folder
//!
//! # Invariants
//!
//! - Never mutates the filesystem
//! - Mismatches are returned as [`Discrepancy`] values; only I/O failures
//!   on the folders themselves are errors
//! - One missing path yields one discrepancy
//!
//! # Example
//!
//! ```
//! use depforest::core::verify::{ExpectedLayout, LayoutVerifier};
//!
//! let temp = tempfile::tempdir().unwrap();
//! let repos = temp.path().join("repos");
//! let gitdirs = temp.path().join("gitdirs");
//!
//! let verifier = LayoutVerifier::default();
//! let found = verifier.verify(&repos, &gitdirs, &ExpectedLayout::default()).unwrap();
//! assert!(found.is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::manifest::ManifestReader;
use crate::core::paths::LayoutPaths;
use crate::git::{read_redirect, STORE_DIRS, STORE_FILES};

/// Errors from verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse expected layout {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// The layout a caller expects to find.
///
/// # Example
///
/// ```toml
/// master_repos = ["app", "lib"]
/// git_dirs = ["app.git", "lib.git"]
///
/// [repo_hashes]
/// "app" = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
/// "lib.v1" = ""
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ExpectedLayout {
    /// Names of master trees (no revision suffix)
    pub master_repos: Vec<String>,
    /// Folder names of store entries (`<name>.git`)
    pub git_dirs: Vec<String>,
    /// Repo folder name to expected manifest digest; empty means no manifest
    pub repo_hashes: BTreeMap<String, String>,
}

impl ExpectedLayout {
    /// Load from a TOML file, or JSON when the extension is `.json`.
    pub fn load(path: &Path) -> Result<Self, VerifyError> {
        let contents = fs::read_to_string(path).map_err(|e| VerifyError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let parse_error = |message: String| VerifyError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))
        } else {
            toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))
        }
    }
}

/// One mismatch between the expected and the actual layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// An expected repo folder does not exist.
    MissingRepo { name: String, path: PathBuf },

    /// A manifest was expected but is absent.
    MissingManifest {
        name: String,
        path: PathBuf,
        expected: String,
    },

    /// A manifest exists where none was expected.
    UnexpectedManifest { name: String, path: PathBuf },

    /// The manifest digest differs from the expected one.
    HashMismatch {
        name: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// An expected master repo folder does not exist.
    MissingMasterRepo { name: String, path: PathBuf },

    /// A master repo's redirect record is missing or points elsewhere.
    RedirectMismatch {
        name: String,
        path: PathBuf,
        expected: String,
        actual: Option<String>,
    },

    /// A repo folder that nothing expects.
    ExtraRepo { name: String, path: PathBuf },

    /// An expected store entry does not exist.
    MissingGitDir { name: String, path: PathBuf },

    /// A store entry that nothing expects.
    ExtraGitDir { name: String, path: PathBuf },

    /// A store entry lacks part of the standard bare layout.
    Structural { git_dir: String, missing: PathBuf },
}

impl Discrepancy {
    /// The filesystem path the discrepancy is about.
    pub fn path(&self) -> &Path {
        match self {
            Discrepancy::MissingRepo { path, .. }
            | Discrepancy::MissingManifest { path, .. }
            | Discrepancy::UnexpectedManifest { path, .. }
            | Discrepancy::HashMismatch { path, .. }
            | Discrepancy::MissingMasterRepo { path, .. }
            | Discrepancy::RedirectMismatch { path, .. }
            | Discrepancy::ExtraRepo { path, .. }
            | Discrepancy::MissingGitDir { path, .. }
            | Discrepancy::ExtraGitDir { path, .. } => path,
            Discrepancy::Structural { missing, .. } => missing,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::MissingRepo { path, .. } => {
                write!(f, "missing repo folder {}", path.display())
            }
            Discrepancy::MissingManifest { path, expected, .. } => write!(
                f,
                "missing manifest {} (expected hash {})",
                path.display(),
                expected
            ),
            Discrepancy::UnexpectedManifest { path, .. } => {
                write!(f, "unexpected manifest {}", path.display())
            }
            Discrepancy::HashMismatch {
                path,
                expected,
                actual,
                ..
            } => write!(
                f,
                "hash mismatch for {}: expected {}, found {}",
                path.display(),
                expected,
                actual
            ),
            Discrepancy::MissingMasterRepo { path, .. } => {
                write!(f, "missing master repo {}", path.display())
            }
            Discrepancy::RedirectMismatch {
                path,
                expected,
                actual,
                ..
            } => match actual {
                Some(actual) => write!(
                    f,
                    "redirect in {} points to {}, expected {}",
                    path.display(),
                    actual,
                    expected
                ),
                None => write!(f, "no redirect record in {}", path.display()),
            },
            Discrepancy::ExtraRepo { path, .. } => {
                write!(f, "unexpected repo folder {}", path.display())
            }
            Discrepancy::MissingGitDir { path, .. } => {
                write!(f, "missing git dir {}", path.display())
            }
            Discrepancy::ExtraGitDir { path, .. } => {
                write!(f, "unexpected git dir {}", path.display())
            }
            Discrepancy::Structural { git_dir, missing } => {
                write!(f, "git dir {} is missing {}", git_dir, missing.display())
            }
        }
    }
}

/// Walks a repos folder and a git-dir folder and compares them against an
/// [`ExpectedLayout`].
#[derive(Debug, Clone, Default)]
pub struct LayoutVerifier {
    manifest: ManifestReader,
}

impl LayoutVerifier {
    /// Create a verifier hashing manifests found by `manifest`.
    pub fn new(manifest: ManifestReader) -> Self {
        Self { manifest }
    }

    /// Compare the two folders with `expected`.
    ///
    /// A folder that does not exist is treated as empty. The result is
    /// empty when everything matches.
    pub fn verify(
        &self,
        repos_folder: &Path,
        git_dir_folder: &Path,
        expected: &ExpectedLayout,
    ) -> Result<Vec<Discrepancy>, VerifyError> {
        let mut found = Vec::new();
        let paths = LayoutPaths::new(repos_folder.to_path_buf(), git_dir_folder.to_path_buf());

        for (name, expected_hash) in &expected.repo_hashes {
            self.check_repo(repos_folder, name, expected_hash, &mut found)?;
        }

        for name in &expected.master_repos {
            let dir = repos_folder.join(name);
            if !dir.is_dir() {
                // Already reported as a missing repo.
                if !expected.repo_hashes.contains_key(name) {
                    found.push(Discrepancy::MissingMasterRepo {
                        name: name.clone(),
                        path: dir,
                    });
                }
                continue;
            }

            let expected_target = paths.git_dir(name).display().to_string();
            let actual = read_redirect(&dir).map_err(|e| VerifyError::Io {
                path: LayoutPaths::redirect_path(&dir),
                source: e,
            })?;
            let matches = actual
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(&expected_target));
            if !matches {
                found.push(Discrepancy::RedirectMismatch {
                    name: name.clone(),
                    path: dir,
                    expected: expected_target,
                    actual,
                });
            }
        }

        let tracked: BTreeSet<&str> = expected
            .repo_hashes
            .keys()
            .map(String::as_str)
            .chain(expected.master_repos.iter().map(String::as_str))
            .collect();
        for name in list_dirs(repos_folder)? {
            if !tracked.contains(name.as_str()) {
                found.push(Discrepancy::ExtraRepo {
                    path: repos_folder.join(&name),
                    name,
                });
            }
        }

        for name in &expected.git_dirs {
            check_git_dir(git_dir_folder, name, &mut found);
        }

        let expected_git_dirs: BTreeSet<&str> =
            expected.git_dirs.iter().map(String::as_str).collect();
        for name in list_dirs(git_dir_folder)? {
            if !expected_git_dirs.contains(name.as_str()) {
                found.push(Discrepancy::ExtraGitDir {
                    path: git_dir_folder.join(&name),
                    name,
                });
            }
        }

        debug!(discrepancies = found.len(), "layout verified");
        Ok(found)
    }

    fn check_repo(
        &self,
        repos_folder: &Path,
        name: &str,
        expected_hash: &str,
        found: &mut Vec<Discrepancy>,
    ) -> Result<(), VerifyError> {
        let dir = repos_folder.join(name);
        if !dir.is_dir() {
            found.push(Discrepancy::MissingRepo {
                name: name.to_string(),
                path: dir,
            });
            return Ok(());
        }

        let manifest_path = self.manifest.manifest_path(&dir);
        let actual = self
            .manifest
            .content_hash(&dir)
            .map_err(|e| VerifyError::Io {
                path: manifest_path.clone(),
                source: e,
            })?;

        match actual {
            Some(_) if expected_hash.is_empty() => found.push(Discrepancy::UnexpectedManifest {
                name: name.to_string(),
                path: manifest_path,
            }),
            Some(hash) if !hash.matches(expected_hash) => found.push(Discrepancy::HashMismatch {
                name: name.to_string(),
                path: manifest_path,
                expected: expected_hash.to_string(),
                actual: hash.to_string(),
            }),
            None if !expected_hash.is_empty() => found.push(Discrepancy::MissingManifest {
                name: name.to_string(),
                path: manifest_path,
                expected: expected_hash.to_string(),
            }),
            _ => {}
        }
        Ok(())
    }

    /// Describe the current contents of both folders as an
    /// [`ExpectedLayout`].
    ///
    /// Every repo folder gets its manifest digest (empty when absent),
    /// folders without a `.` are master repos and every store entry is
    /// listed.
    pub fn snapshot(
        &self,
        repos_folder: &Path,
        git_dir_folder: &Path,
    ) -> Result<ExpectedLayout, VerifyError> {
        let mut layout = ExpectedLayout::default();

        for name in list_dirs(repos_folder)? {
            let dir = repos_folder.join(&name);
            let hash = self
                .manifest
                .content_hash(&dir)
                .map_err(|e| VerifyError::Io {
                    path: self.manifest.manifest_path(&dir),
                    source: e,
                })?;
            if !name.contains('.') {
                layout.master_repos.push(name.clone());
            }
            layout
                .repo_hashes
                .insert(name, hash.map(|h| h.to_string()).unwrap_or_default());
        }

        layout.git_dirs = list_dirs(git_dir_folder)?.into_iter().collect();
        Ok(layout)
    }
}

fn check_git_dir(git_dir_folder: &Path, name: &str, found: &mut Vec<Discrepancy>) {
    let root = git_dir_folder.join(name);
    if !root.is_dir() {
        found.push(Discrepancy::MissingGitDir {
            name: name.to_string(),
            path: root,
        });
        return;
    }

    let missing_dirs = STORE_DIRS
        .iter()
        .map(|d| root.join(d))
        .filter(|p| !p.is_dir());
    let missing_files = STORE_FILES
        .iter()
        .map(|f| root.join(f))
        .filter(|p| !p.is_file());

    for missing in missing_dirs.chain(missing_files) {
        found.push(Discrepancy::Structural {
            git_dir: name.to_string(),
            missing,
        });
    }
}

/// Names of the directories directly inside `folder`, sorted.
///
/// A folder that does not exist has no entries.
fn list_dirs(folder: &Path) -> Result<BTreeSet<String>, VerifyError> {
    let io_error = |e: io::Error| VerifyError::Io {
        path: folder.to_path_buf(),
        source: e,
    };

    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(io_error(e)),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_dir() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}
