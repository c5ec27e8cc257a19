//! core::manifest
//!
//! Reads the per-repository dependency manifest from a checked-out tree.
//!
//! # Contract
//!
//! - A tree without a manifest has no dependencies ([`ManifestError::Missing`]
//!   is the caller's signal for that, not a failure).
//! - A manifest that exists but cannot be parsed is
//!   [`ManifestError::Malformed`].
//! - Entries under `<ToolsetDependencies>` are toolset edges.
//! - Reading never touches the git-dir store; only files already on disk
//!   are consulted.
//!
//! Declarations that name the same `(target, revision)` pair collapse into
//! one edge. The merged edge is toolset only when every declaration is.
//!
//! # Example
//!
//! ```
//! use depforest::core::manifest::ManifestReader;
//! use depforest::core::types::RepositoryIdentity;
//! use std::fs;
//!
//! let tree = tempfile::tempdir().unwrap();
//! fs::create_dir_all(tree.path().join("eng")).unwrap();
//! fs::write(
//!     tree.path().join("eng/Version.Details.xml"),
//!     "<Dependencies><ProductDependencies><Dependency Name=\"Lib\">\
//!      <Uri>https://github.com/org/lib</Uri><Sha>v1</Sha>\
//!      </Dependency></ProductDependencies></Dependencies>",
//! )
//! .unwrap();
//!
//! let source = RepositoryIdentity::parse("https://github.com/org/app").unwrap();
//! let edges = ManifestReader::default().read(&source, tree.path()).unwrap();
//! assert_eq!(edges.len(), 1);
//! assert_eq!(edges.iter().next().unwrap().target.name(), "lib");
//! ```

pub mod schema;

pub use schema::{Declaration, DependencySection, ManifestFile};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::DEFAULT_MANIFEST_PATH;
use crate::core::types::{ContentHash, RepositoryIdentity, Revision};

/// Errors from reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No manifest in the tree. Callers treat this as zero dependencies.
    #[error("no manifest at {path}")]
    Missing { path: PathBuf },

    /// The manifest exists but is not valid.
    #[error("malformed manifest {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// The manifest exists but could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A dependency declared by one repository on another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Repository whose manifest declared the edge
    pub source: RepositoryIdentity,
    /// Repository depended upon
    pub target: RepositoryIdentity,
    /// URI the target is fetched from
    pub target_uri: String,
    /// Pinned revision of the target
    pub revision: Revision,
    /// Build-tooling dependency
    pub is_toolset: bool,
}

/// Locates and parses manifests at a fixed path inside working trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestReader {
    relative_path: PathBuf,
}

impl Default for ManifestReader {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_PATH)
    }
}

impl ManifestReader {
    /// Create a reader for manifests at `relative_path` inside each tree.
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
        }
    }

    /// Manifest location relative to a working tree.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Manifest location inside `tree`.
    pub fn manifest_path(&self, tree: &Path) -> PathBuf {
        tree.join(&self.relative_path)
    }

    /// Read the dependency edges declared in `tree` on behalf of `source`.
    ///
    /// # Errors
    ///
    /// - [`ManifestError::Missing`] if the tree has no manifest
    /// - [`ManifestError::Malformed`] if the file is not a valid manifest
    /// - [`ManifestError::Io`] if the file exists but cannot be read
    pub fn read(
        &self,
        source: &RepositoryIdentity,
        tree: &Path,
    ) -> Result<BTreeSet<DependencyEdge>, ManifestError> {
        let path = self.manifest_path(tree);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::Missing { path })
            }
            Err(e) => return Err(ManifestError::Io { path, source: e }),
        };

        let malformed = |message: String| ManifestError::Malformed {
            path: path.clone(),
            message,
        };

        let text = String::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?;
        let file: ManifestFile =
            quick_xml::de::from_str(&text).map_err(|e| malformed(e.to_string()))?;

        // (target, revision) -> (uri of first declaration, all toolset so far)
        let mut merged: BTreeMap<(RepositoryIdentity, Revision), (String, bool)> = BTreeMap::new();
        for (index, (decl, is_toolset)) in file.declarations().enumerate() {
            let label = decl.name.as_deref().unwrap_or("<unnamed>");
            let target = RepositoryIdentity::parse(decl.uri.trim())
                .map_err(|e| malformed(format!("dependency {} ({label}): {e}", index + 1)))?;
            let revision = Revision::new(decl.sha.trim())
                .map_err(|e| malformed(format!("dependency {} ({label}): {e}", index + 1)))?;

            merged
                .entry((target, revision))
                .and_modify(|(_, toolset)| *toolset &= is_toolset)
                .or_insert_with(|| (decl.uri.trim().to_string(), is_toolset));
        }

        Ok(merged
            .into_iter()
            .map(|((target, revision), (target_uri, is_toolset))| DependencyEdge {
                source: source.clone(),
                target,
                target_uri,
                revision,
                is_toolset,
            })
            .collect())
    }

    /// SHA-256 of the manifest in `tree`, or `None` when it is absent.
    pub fn content_hash(&self, tree: &Path) -> io::Result<Option<ContentHash>> {
        match fs::read(self.manifest_path(tree)) {
            Ok(bytes) => Ok(Some(ContentHash::of_bytes(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source() -> RepositoryIdentity {
        RepositoryIdentity::parse("https://example.com/org/app").unwrap()
    }

    fn tree_with(contents: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("eng")).unwrap();
        fs::write(temp.path().join(DEFAULT_MANIFEST_PATH), contents).unwrap();
        temp
    }

    /// `<Dependency>` elements for `(name, uri, sha)` triples.
    fn entries(deps: &[(&str, &str, &str)]) -> String {
        deps.iter()
            .map(|(name, uri, sha)| {
                format!("<Dependency Name=\"{name}\"><Uri>{uri}</Uri><Sha>{sha}</Sha></Dependency>")
            })
            .collect()
    }

    fn manifest(product: &[(&str, &str, &str)], toolset: &[(&str, &str, &str)]) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Dependencies>\n\
             <ProductDependencies>{}</ProductDependencies>\n\
             <ToolsetDependencies>{}</ToolsetDependencies>\n</Dependencies>\n",
            entries(product),
            entries(toolset)
        )
    }

    mod read {
        use super::*;

        #[test]
        fn missing_manifest() {
            let temp = TempDir::new().unwrap();
            let result = ManifestReader::default().read(&source(), temp.path());
            assert!(matches!(result, Err(ManifestError::Missing { .. })));
        }

        #[test]
        fn empty_sections_have_no_edges() {
            let temp = tree_with(&manifest(&[], &[]));
            let edges = ManifestReader::default().read(&source(), temp.path()).unwrap();
            assert!(edges.is_empty());
        }

        #[test]
        fn edges_carry_source_and_flags() {
            let temp = tree_with(&manifest(
                &[("Lib", "https://example.com/org/Lib.git", "v1")],
                &[("Tools.Sdk", "git@example.com:org/tools", "abc")],
            ));
            let edges: Vec<_> = ManifestReader::default()
                .read(&source(), temp.path())
                .unwrap()
                .into_iter()
                .collect();

            assert_eq!(edges.len(), 2);
            assert!(edges.iter().all(|e| e.source == source()));

            let lib = edges.iter().find(|e| e.target.name() == "lib").unwrap();
            assert_eq!(lib.target_uri, "https://example.com/org/Lib.git");
            assert_eq!(lib.revision.as_str(), "v1");
            assert!(!lib.is_toolset);

            let tools = edges.iter().find(|e| e.target.name() == "tools").unwrap();
            assert!(tools.is_toolset);
        }

        #[test]
        fn duplicate_declarations_merge() {
            let temp = tree_with(&manifest(
                &[("A.Runtime", "https://example.com/org/a.git", "v1")],
                &[("A.Sdk", "https://example.com/org/a", "v1")],
            ));
            let edges = ManifestReader::default().read(&source(), temp.path()).unwrap();
            assert_eq!(edges.len(), 1);
            assert!(!edges.iter().next().unwrap().is_toolset);
        }

        #[test]
        fn same_target_different_revisions_stay_separate() {
            let temp = tree_with(&manifest(
                &[
                    ("A", "https://example.com/org/a", "v1"),
                    ("A.Extra", "https://example.com/org/a", "v2"),
                ],
                &[],
            ));
            let edges = ManifestReader::default().read(&source(), temp.path()).unwrap();
            assert_eq!(edges.len(), 2);
        }

        #[test]
        fn all_toolset_declarations_stay_toolset() {
            let temp = tree_with(&manifest(
                &[],
                &[
                    ("A.Sdk", "https://example.com/org/a", "v1"),
                    ("A.Tasks", "https://example.com/org/a", "v1"),
                ],
            ));
            let edges = ManifestReader::default().read(&source(), temp.path()).unwrap();
            assert!(edges.iter().next().unwrap().is_toolset);
        }

        #[test]
        fn values_are_trimmed() {
            let temp = tree_with(
                "<Dependencies><ProductDependencies><Dependency Name=\"A\">\n\
                 <Uri>\n  https://example.com/org/a\n</Uri>\n<Sha> v1 </Sha>\n\
                 </Dependency></ProductDependencies></Dependencies>",
            );
            let edges = ManifestReader::default().read(&source(), temp.path()).unwrap();
            let edge = edges.iter().next().unwrap();
            assert_eq!(edge.target_uri, "https://example.com/org/a");
            assert_eq!(edge.revision.as_str(), "v1");
        }
    }

    mod malformed {
        use super::*;

        fn assert_malformed(contents: &str) {
            let temp = tree_with(contents);
            let result = ManifestReader::default().read(&source(), temp.path());
            assert!(
                matches!(result, Err(ManifestError::Malformed { .. })),
                "expected malformed for {contents:?}, got {result:?}"
            );
        }

        #[test]
        fn invalid_xml() {
            assert_malformed("<Dependencies><ProductDependencies><Dependency>");
        }

        #[test]
        fn empty_file() {
            assert_malformed("");
        }

        #[test]
        fn missing_uri() {
            assert_malformed(
                "<Dependencies><ProductDependencies><Dependency Name=\"A\">\
                 <Sha>v1</Sha></Dependency></ProductDependencies></Dependencies>",
            );
        }

        #[test]
        fn invalid_uri() {
            assert_malformed(&manifest(&[("A", " ", "v1")], &[]));
        }

        #[test]
        fn invalid_revision() {
            assert_malformed(&manifest(&[("A", "https://e.com/a", "two words")], &[]));
        }

        #[test]
        fn not_utf8() {
            let temp = TempDir::new().unwrap();
            fs::create_dir_all(temp.path().join("eng")).unwrap();
            fs::write(temp.path().join(DEFAULT_MANIFEST_PATH), [0xff, 0xfe, 0x00]).unwrap();
            let result = ManifestReader::default().read(&source(), temp.path());
            assert!(matches!(result, Err(ManifestError::Malformed { .. })));
        }
    }

    mod content_hash {
        use super::*;

        #[test]
        fn absent_manifest_has_no_hash() {
            let temp = TempDir::new().unwrap();
            assert!(ManifestReader::default().content_hash(temp.path()).unwrap().is_none());
        }

        #[test]
        fn hash_is_over_raw_bytes() {
            let temp = tree_with("abc");
            let hash = ManifestReader::default().content_hash(temp.path()).unwrap().unwrap();
            assert_eq!(hash, ContentHash::of_bytes(b"abc"));
        }

        #[test]
        fn custom_relative_path() {
            let temp = TempDir::new().unwrap();
            fs::write(temp.path().join("deps.xml"), "<Dependencies />").unwrap();
            let reader = ManifestReader::new("deps.xml");
            assert!(reader.content_hash(temp.path()).unwrap().is_some());
            assert!(reader.read(&source(), temp.path()).unwrap().is_empty());
        }
    }
}
