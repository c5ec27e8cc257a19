//! core
//!
//! Core domain types, schemas, and operations for depforest.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RepositoryIdentity, Revision, Oid, ContentHash
//! - [`paths`] - Centralized path routing for the clone layout
//! - [`manifest`] - Dependency manifest schema and reading
//! - [`verify`] - Layout verification against an expected model
//! - [`ops`] - Store locking
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - All verification is deterministic

pub mod config;
pub mod manifest;
pub mod ops;
pub mod paths;
pub mod types;
pub mod verify;
