//! core::ops::lock
//!
//! Exclusive lock on a git-dir store.
//!
//! # Architecture
//!
//! The store lock ensures only one clone run grows a given git-dir folder at
//! a time. Two processes fetching into the same bare stores would race on
//! ref locks and could both decide to initialize the same entry.
//!
//! The lock file is a plain file, `<git_dir_folder>/.depforest.lock`, so it
//! never shows up as a store entry during verification.
//!
//! # Invariants
//!
//! - Lock must be held for the entire clone run
//! - Lock is automatically released on drop (RAII pattern)
//! - Lock acquisition is non-blocking (fails fast if locked)
//!
//! # Example
//!
//! ```ignore
//! use depforest::core::ops::lock::StoreLock;
//! use depforest::core::paths::LayoutPaths;
//!
//! let lock = StoreLock::acquire(&paths)?;
//! // ... clone ...
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::LayoutPaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("git-dir store is locked by another depforest process")]
    AlreadyLocked,

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on a git-dir store.
///
/// The lock is automatically released when this guard is dropped.
#[derive(Debug)]
pub struct StoreLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl StoreLock {
    /// Attempt to acquire the store lock.
    ///
    /// This uses OS-level file locking via `fs2`, which works across
    /// processes. The git-dir folder is created if it does not exist.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(paths: &LayoutPaths) -> Result<Self, LockError> {
        Self::acquire_at(&paths.lock_path())
    }

    /// Attempt to acquire a lock at an explicit lock-file path.
    pub fn acquire_at(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Try to acquire the lock, returning None if already held.
    pub fn try_acquire(paths: &LayoutPaths) -> Result<Option<Self>, LockError> {
        match Self::acquire(paths) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    ///
    /// This is called automatically on drop.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Best-effort release on drop
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
