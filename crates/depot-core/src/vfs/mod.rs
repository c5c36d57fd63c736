//! Virtual repository filesystem.
//!
//! Every artifact, metadata file and index directory is addressed as a
//! [`VirtualPath`] obtained from the [`VirtualFileSystem`] of exactly one
//! repository.

mod filesystem;
mod path;
mod provider;
mod registry;

pub use filesystem::VirtualFileSystem;
pub use path::VirtualPath;
pub use provider::{BackendProvider, PathProvider, TrashAwareProvider};
pub use registry::FileSystemRegistry;
