//! Local-disk storage backend.

use super::{ByteSink, ByteStream, FileAttributes, StorageBackend, StorageError};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

/// Alias of the local-disk backend in repository configuration.
pub const FILE_SYSTEM_ALIAS: &str = "file-system";

/// [`StorageBackend`] over the local filesystem using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackend;

impl FsBackend {
    /// Create a local-disk backend.
    pub fn new() -> Self {
        Self
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }
    Ok(())
}

async fn remove_any(path: &Path) -> Result<bool, StorageError> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(true),
        // Lost a race with another deleter.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    fn alias(&self) -> &str {
        FILE_SYSTEM_ALIAS
    }

    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn attributes(&self, path: &Path) -> Result<Option<FileAttributes>, StorageError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(FileAttributes {
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta.modified().ok(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn open_read(&self, path: &Path) -> Result<ByteStream, StorageError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn open_write(&self, path: &Path) -> Result<ByteSink, StorageError> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        Ok(Box::pin(file))
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(dir, e)),
        };
        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(dir, e))?
        {
            children.push(entry.path());
        }
        children.sort();
        Ok(children)
    }

    async fn create_dirs(&self, dir: &Path) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::io(dir, e))
    }

    async fn move_path(&self, src: &Path, dst: &Path) -> Result<(), StorageError> {
        ensure_parent(dst).await?;
        if let Ok(meta) = tokio::fs::symlink_metadata(dst).await {
            // rename(2) cannot replace a non-empty directory.
            if meta.is_dir() {
                remove_any(dst).await?;
            }
        }
        tokio::fs::rename(src, dst)
            .await
            .map_err(|e| StorageError::io(src, e))
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), StorageError> {
        ensure_parent(dst).await?;
        tokio::fs::copy(src, dst)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::io(src, e))
    }

    async fn delete(&self, path: &Path) -> Result<bool, StorageError> {
        remove_any(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn write_read_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new();
        let file = dir.path().join("a.txt");

        let mut sink = backend.open_write(&file).await.unwrap();
        sink.write_all(b"hello").await.unwrap();
        sink.shutdown().await.unwrap();

        let mut stream = backend.open_read(&file).await.unwrap();
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(data, b"hello");

        let attrs = backend.attributes(&file).await.unwrap().unwrap();
        assert!(!attrs.is_dir);
        assert_eq!(attrs.size, 5);
        assert_eq!(backend.list(dir.path()).await.unwrap(), vec![file]);
        assert!(backend.list(&dir.path().join("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn move_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("nested/deeper/dst.bin");
        std::fs::write(&src, b"new").unwrap();
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, b"old").unwrap();

        backend.move_path(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new();
        assert!(!backend.delete(&dir.path().join("nope")).await.unwrap());

        let sub = dir.path().join("sub");
        std::fs::create_dir_all(sub.join("x")).unwrap();
        std::fs::write(sub.join("x/f"), b"1").unwrap();
        assert!(backend.delete(&sub).await.unwrap());
        assert!(!sub.exists());
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsBackend::new()
            .open_read(&dir.path().join("missing"))
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }
}
