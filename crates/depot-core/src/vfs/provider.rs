//! Path operations over virtual paths.
//!
//! [`BackendProvider`] delegates every operation to the repository's
//! storage backend. [`TrashAwareProvider`] decorates another provider and
//! only special-cases deletion, so every caller gets the same soft-delete
//! behavior.

use super::path::VirtualPath;
use super::filesystem::VirtualFileSystem;
use crate::storage::{ByteSink, ByteStream, FileAttributes, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Standard path operations on [`VirtualPath`]s.
#[async_trait]
pub trait PathProvider: Send + Sync + std::fmt::Debug {
    /// Returns true if `path` exists.
    async fn exists(&self, path: &VirtualPath) -> Result<bool, StorageError>;

    /// Attributes of `path`, `None` if absent.
    async fn attributes(&self, path: &VirtualPath)
    -> Result<Option<FileAttributes>, StorageError>;

    /// Open `path` for reading.
    async fn open_read(&self, path: &VirtualPath) -> Result<ByteStream, StorageError>;

    /// Create or truncate `path` for writing.
    async fn open_write(&self, path: &VirtualPath) -> Result<ByteSink, StorageError>;

    /// Children of `dir`, sorted.
    async fn list(&self, dir: &VirtualPath) -> Result<Vec<VirtualPath>, StorageError>;

    /// Create `dir` with its parents.
    async fn create_dirs(&self, dir: &VirtualPath) -> Result<(), StorageError>;

    /// Move `src` to `dst`, replacing `dst`.
    async fn move_path(&self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), StorageError>;

    /// Copy `src` to `dst`, replacing `dst`.
    async fn copy(&self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), StorageError>;

    /// Delete `path`. Returns false if nothing existed.
    async fn delete(&self, path: &VirtualPath) -> Result<bool, StorageError>;
}

/// Provider that forwards to the owning repository's backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendProvider;

fn child_path(dir: &VirtualPath, child: &std::path::Path) -> Option<VirtualPath> {
    let name = child.file_name()?.to_str()?;
    dir.join(name).ok()
}

#[async_trait]
impl PathProvider for BackendProvider {
    async fn exists(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        path.file_system().backend().exists(path.target()).await
    }

    async fn attributes(
        &self,
        path: &VirtualPath,
    ) -> Result<Option<FileAttributes>, StorageError> {
        path.file_system().backend().attributes(path.target()).await
    }

    async fn open_read(&self, path: &VirtualPath) -> Result<ByteStream, StorageError> {
        path.file_system().backend().open_read(path.target()).await
    }

    async fn open_write(&self, path: &VirtualPath) -> Result<ByteSink, StorageError> {
        path.file_system().backend().open_write(path.target()).await
    }

    async fn list(&self, dir: &VirtualPath) -> Result<Vec<VirtualPath>, StorageError> {
        let children = dir.file_system().backend().list(dir.target()).await?;
        Ok(children
            .iter()
            .filter_map(|child| child_path(dir, child))
            .collect())
    }

    async fn create_dirs(&self, dir: &VirtualPath) -> Result<(), StorageError> {
        dir.file_system().backend().create_dirs(dir.target()).await
    }

    async fn move_path(&self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), StorageError> {
        src.file_system()
            .backend()
            .move_path(src.target(), dst.target())
            .await
    }

    async fn copy(&self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), StorageError> {
        src.file_system()
            .backend()
            .copy(src.target(), dst.target())
            .await
    }

    async fn delete(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        path.file_system().backend().delete(path.target()).await
    }
}

/// Decorator that turns deletes into moves under `.trash` for repositories
/// with trash enabled.
#[derive(Debug, Clone, Default)]
pub struct TrashAwareProvider<P = BackendProvider> {
    delegate: P,
}

impl TrashAwareProvider<BackendProvider> {
    /// Decorate the plain backend provider.
    pub fn new() -> Self {
        Self {
            delegate: BackendProvider,
        }
    }
}

impl<P: PathProvider> TrashAwareProvider<P> {
    /// The undecorated provider, for hard deletes.
    pub fn delegate(&self) -> &P {
        &self.delegate
    }

    /// Move a trash entry back to its original location, replacing any file
    /// there. Returns false if no trash entry exists.
    pub async fn restore_trash(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        let fs = path.file_system();
        let trash = fs.trash_path(path);
        if !self.delegate.exists(&trash).await? {
            return Ok(false);
        }
        self.delegate.move_path(&trash, path).await?;
        self.prune_empty_dirs(&trash).await?;
        info!(path = %path, "Restored from trash");
        Ok(true)
    }

    /// Permanently remove the trash entry for `path`.
    pub async fn delete_trash(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        let trash = path.file_system().trash_path(path);
        let removed = self.delegate.delete(&trash).await?;
        if removed {
            self.prune_empty_dirs(&trash).await?;
            debug!(path = %path, "Removed trash entry");
        }
        Ok(removed)
    }

    /// Remove the whole `.trash` subtree of a repository.
    pub async fn empty_trash(&self, fs: &Arc<VirtualFileSystem>) -> Result<bool, StorageError> {
        let removed = self.delegate.delete(&fs.trash_root()).await?;
        if removed {
            info!(repository = %fs.key(), "Emptied trash");
        }
        Ok(removed)
    }

    /// Restore every trash entry of a repository. Returns the restored
    /// files at their original locations.
    pub async fn restore_all(
        &self,
        fs: &Arc<VirtualFileSystem>,
    ) -> Result<Vec<VirtualPath>, StorageError> {
        let mut restored = Vec::new();
        let mut pending = vec![fs.trash_root()];
        while let Some(dir) = pending.pop() {
            for entry in self.delegate.list(&dir).await? {
                let is_dir = self
                    .delegate
                    .attributes(&entry)
                    .await?
                    .is_some_and(|a| a.is_dir);
                if is_dir {
                    pending.push(entry);
                } else if let Some(original) = fs.untrashed_path(&entry) {
                    self.delegate.move_path(&entry, &original).await?;
                    restored.push(original);
                }
            }
        }
        self.delegate.delete(&fs.trash_root()).await?;
        info!(repository = %fs.key(), restored = restored.len(), "Restored trash");
        Ok(restored)
    }

    /// Remove now-empty directories between `entry` and the trash root.
    async fn prune_empty_dirs(&self, entry: &VirtualPath) -> Result<(), StorageError> {
        let trash_root = entry.file_system().trash_root();
        let mut current = entry.parent();
        while let Some(dir) = current {
            if dir == trash_root || dir.is_root() || !self.delegate.list(&dir).await?.is_empty() {
                break;
            }
            self.delegate.delete(&dir).await?;
            current = dir.parent();
        }
        Ok(())
    }
}

#[async_trait]
impl<P: PathProvider> PathProvider for TrashAwareProvider<P> {
    async fn exists(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        self.delegate.exists(path).await
    }

    async fn attributes(
        &self,
        path: &VirtualPath,
    ) -> Result<Option<FileAttributes>, StorageError> {
        self.delegate.attributes(path).await
    }

    async fn open_read(&self, path: &VirtualPath) -> Result<ByteStream, StorageError> {
        self.delegate.open_read(path).await
    }

    async fn open_write(&self, path: &VirtualPath) -> Result<ByteSink, StorageError> {
        self.delegate.open_write(path).await
    }

    async fn list(&self, dir: &VirtualPath) -> Result<Vec<VirtualPath>, StorageError> {
        self.delegate.list(dir).await
    }

    async fn create_dirs(&self, dir: &VirtualPath) -> Result<(), StorageError> {
        self.delegate.create_dirs(dir).await
    }

    async fn move_path(&self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), StorageError> {
        self.delegate.move_path(src, dst).await
    }

    async fn copy(&self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), StorageError> {
        self.delegate.copy(src, dst).await
    }

    async fn delete(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        if !self.delegate.exists(path).await? {
            return Ok(false);
        }
        if !path.repository().trash_enabled || path.is_internal() {
            return self.delegate.delete(path).await;
        }
        let trash = path.file_system().trash_path(path);
        self.delegate.move_path(path, &trash).await?;
        debug!(path = %path, "Moved to trash");
        Ok(true)
    }
}
