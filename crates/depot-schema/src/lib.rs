//! Shared types for depot: repository configuration, metadata documents,
//! checksums and version ordering.
//!
//! This crate performs no I/O; it is the vocabulary the core engine and the
//! CLI agree on.

pub mod hash;
pub mod metadata;
pub mod repository;
pub mod version;

// Re-exports
pub use hash::*;
pub use metadata::{Metadata, Snapshot, SnapshotVersion, Versioning};
pub use repository::*;
pub use version::{SnapshotBuild, compare_versions};
