//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. All store reads and writes
//! flow through this interface. Direct parsing of `.git` records outside
//! this module is prohibited. No other module should import `git2`.
//!
//! We use the `git2` crate exclusively (no shelling out to the git CLI).
//!
//! # Responsibilities
//!
//! - Bare store initialization and the standard store layout
//! - Fetching from origin and classifying fetch failures
//! - Resolving revisions to commits
//! - Writing working trees from a commit
//! - Attaching a master tree to its store entry
//! - Reading and writing redirect records
//!
//! # Invariants
//!
//! - No other module calls git2 directly
//! - All operations return strong types (Oid)
//! - Working trees never receive an object database of their own

mod interface;

pub use interface::{
    read_redirect, write_redirect, Git, GitError, ORIGIN, STORE_DIRS, STORE_FILES,
};
