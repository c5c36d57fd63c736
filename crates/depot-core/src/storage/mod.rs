//! Storage backend contract.
//!
//! A [`StorageBackend`] adapts one physical medium to a minimal
//! byte-addressable path API. Everything above this layer addresses
//! artifacts through [`crate::vfs::VirtualPath`] instead of raw backend paths.

mod fs;

pub use fs::FsBackend;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// A boxed stream of artifact bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// A boxed sink artifact bytes are written to.
pub type ByteSink = Pin<Box<dyn AsyncWrite + Send + Sync>>;

/// Errors raised by storage backends and path resolution.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The addressed path does not exist.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A relative path tried to escape its repository root.
    #[error("Path '{path}' escapes the root of repository {repository}")]
    OutsideRoot {
        /// Repository the path was resolved against.
        repository: String,
        /// Offending relative path.
        path: String,
    },

    /// No backend is registered under the configured alias.
    #[error("Unknown storage implementation: {0}")]
    UnknownBackend(String),

    /// Backend I/O failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Backend path the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Wrap an I/O error, mapping `NotFound` to [`StorageError::NotFound`].
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Returns true for [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Drain a stream into memory.
pub async fn read_all(mut stream: ByteStream) -> std::io::Result<Vec<u8>> {
    use futures::StreamExt;
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// File attributes as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    /// True for directories.
    pub is_dir: bool,
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// Last modification time, when the backend tracks one.
    pub modified: Option<SystemTime>,
}

/// Minimal path API over one physical storage medium.
///
/// Implementations must be safe for concurrent use. Moves replace an
/// existing destination and create missing destination parents.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Alias this backend is registered under (e.g. `file-system`).
    fn alias(&self) -> &str;

    /// Returns true if `path` exists.
    async fn exists(&self, path: &Path) -> Result<bool, StorageError>;

    /// Attributes of `path`, or `None` if it does not exist.
    async fn attributes(&self, path: &Path) -> Result<Option<FileAttributes>, StorageError>;

    /// Open `path` for streaming reads.
    async fn open_read(&self, path: &Path) -> Result<ByteStream, StorageError>;

    /// Create or truncate `path` for writing. The parent must exist.
    async fn open_write(&self, path: &Path) -> Result<ByteSink, StorageError>;

    /// Children of `dir`, sorted by name. A missing directory lists as empty.
    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError>;

    /// Create `dir` and all missing parents.
    async fn create_dirs(&self, dir: &Path) -> Result<(), StorageError>;

    /// Move `src` to `dst`, replacing `dst`.
    async fn move_path(&self, src: &Path, dst: &Path) -> Result<(), StorageError>;

    /// Copy the file `src` to `dst`, replacing `dst`.
    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), StorageError>;

    /// Remove `path` (recursively for directories).
    ///
    /// Returns false if nothing existed at `path`.
    async fn delete(&self, path: &Path) -> Result<bool, StorageError>;
}
