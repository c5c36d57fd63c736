use super::path::{VirtualPath, normalize_relative};
use crate::paths::{TEMP_DIR, TRASH_DIR, UPSTREAM_DIR};
use crate::storage::{StorageBackend, StorageError};
use depot_schema::{Repository, RepositoryKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The path namespace of one repository.
///
/// Owns the repository's root on its backend and knows where the `.trash`
/// and `.temp` subtrees live. Every [`VirtualPath`] is created here.
#[derive(Debug)]
pub struct VirtualFileSystem {
    repository: Arc<Repository>,
    root: PathBuf,
    backend: Arc<dyn StorageBackend>,
}

static LAST_TEMP_STAMP: AtomicU64 = AtomicU64::new(0);

/// Nanosecond timestamp, strictly increasing within the process.
fn temp_stamp() -> u64 {
    let now = chrono::Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |n| n.max(0) as u64);
    let mut last = LAST_TEMP_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TEMP_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

impl VirtualFileSystem {
    /// Create the namespace for `repository` rooted at `root` on `backend`.
    pub fn new(
        repository: Arc<Repository>,
        root: impl Into<PathBuf>,
        backend: Arc<dyn StorageBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repository,
            root: root.into(),
            backend,
        })
    }

    /// Repository this namespace belongs to.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Identity of the owning repository.
    pub fn key(&self) -> RepositoryKey {
        self.repository.key()
    }

    /// Backend the namespace is stored on.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Backend path of the repository root.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// The repository root.
    pub fn root(self: &Arc<Self>) -> VirtualPath {
        VirtualPath::new(Arc::clone(self), String::new())
    }

    /// `root/.trash`
    pub fn trash_root(self: &Arc<Self>) -> VirtualPath {
        VirtualPath::new(Arc::clone(self), TRASH_DIR.to_string())
    }

    /// `root/.temp`
    pub fn temp_root(self: &Arc<Self>) -> VirtualPath {
        VirtualPath::new(Arc::clone(self), TEMP_DIR.to_string())
    }

    /// Resolve a repository-relative path.
    ///
    /// Leading slashes and `.` segments are ignored; a `..` segment is
    /// rejected so a path can never leave its repository.
    pub fn resolve(self: &Arc<Self>, relative: &str) -> Result<VirtualPath, StorageError> {
        let normalized =
            normalize_relative(relative).ok_or_else(|| StorageError::OutsideRoot {
                repository: self.key().to_string(),
                path: relative.to_string(),
            })?;
        Ok(VirtualPath::new(Arc::clone(self), normalized))
    }

    /// Location of the trash entry for `path`: `.trash/<relative-path>`.
    pub fn trash_path(self: &Arc<Self>, path: &VirtualPath) -> VirtualPath {
        let relative = path.relative();
        if relative.is_empty() {
            return self.trash_root();
        }
        VirtualPath::new(Arc::clone(self), format!("{TRASH_DIR}/{relative}"))
    }

    /// Original location of a trash entry, the inverse of [`Self::trash_path`].
    pub fn untrashed_path(self: &Arc<Self>, trash_entry: &VirtualPath) -> Option<VirtualPath> {
        let rest = trash_entry
            .relative()
            .strip_prefix(TRASH_DIR)?
            .strip_prefix('/')?;
        Some(VirtualPath::new(Arc::clone(self), rest.to_string()))
    }

    /// Where upstream state for the cached file `path` is recorded:
    /// `.upstream/<relative-path>`.
    pub fn upstream_path(self: &Arc<Self>, path: &VirtualPath) -> VirtualPath {
        VirtualPath::new(
            Arc::clone(self),
            format!("{UPSTREAM_DIR}/{}", path.relative()),
        )
    }

    /// Fresh temporary location for a write to `path`:
    /// `.temp/<relative-path>.<timestamp>`.
    pub fn temp_path(self: &Arc<Self>, path: &VirtualPath) -> VirtualPath {
        VirtualPath::new(
            Arc::clone(self),
            format!("{TEMP_DIR}/{}.{}", path.relative(), temp_stamp()),
        )
    }
}
