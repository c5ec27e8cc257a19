//! core::ops
//!
//! Cross-process coordination for clone runs.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive lock on a git-dir store
//!
//! # Architecture
//!
//! Every clone run acquires the store lock before touching the store and
//! holds it until the run finishes. In-process coordination (per-identity
//! serialization, the visited set) lives in [`crate::store`] and
//! [`crate::engine`]; this lock only keeps two processes apart.

pub mod lock;

pub use lock::{LockError, StoreLock};
