use super::filesystem::VirtualFileSystem;
use crate::paths::{TEMP_DIR, TRASH_DIR, UPSTREAM_DIR};
use crate::storage::StorageError;
use depot_schema::Repository;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Normalize a repository-relative path to `a/b/c` form.
///
/// Returns `None` if any segment is `..`.
pub(crate) fn normalize_relative(relative: &str) -> Option<String> {
    let mut segments = Vec::new();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return None,
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

/// A path scoped to exactly one repository.
///
/// Two virtual paths are equal iff they belong to the same repository and
/// wrap the same backend path.
#[derive(Clone)]
pub struct VirtualPath {
    fs: Arc<VirtualFileSystem>,
    relative: String,
    target: PathBuf,
}

impl VirtualPath {
    pub(super) fn new(fs: Arc<VirtualFileSystem>, relative: String) -> Self {
        let target = if relative.is_empty() {
            fs.root_dir().to_path_buf()
        } else {
            fs.root_dir().join(&relative)
        };
        Self {
            fs,
            relative,
            target,
        }
    }

    /// The namespace this path was created by.
    pub fn file_system(&self) -> &Arc<VirtualFileSystem> {
        &self.fs
    }

    /// The owning repository.
    pub fn repository(&self) -> &Repository {
        self.fs.repository()
    }

    /// Repository-relative form, `/`-separated, empty for the root.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Wrapped backend path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Last path segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.relative.is_empty() {
            return None;
        }
        self.relative.rsplit('/').next()
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.relative.is_empty() {
            return None;
        }
        let parent = self
            .relative
            .rsplit_once('/')
            .map_or("", |(parent, _)| parent);
        Some(Self::new(Arc::clone(&self.fs), parent.to_string()))
    }

    /// Resolve `relative` below this path.
    pub fn join(&self, relative: &str) -> Result<Self, StorageError> {
        if self.relative.is_empty() {
            return self.fs.resolve(relative);
        }
        self.fs.resolve(&format!("{}/{relative}", self.relative))
    }

    /// A file next to this one, e.g. a checksum companion.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self::new(Arc::clone(&self.fs), format!("{}{suffix}", self.relative))
    }

    /// Returns true for the repository root.
    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Returns true for paths inside `.trash`, `.temp` or `.upstream`.
    pub fn is_internal(&self) -> bool {
        let first = self.relative.split('/').next().unwrap_or("");
        [TRASH_DIR, TEMP_DIR, UPSTREAM_DIR].contains(&first)
    }
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.fs.key() == other.fs.key()
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fs.key().hash(state);
        self.target.hash(state);
    }
}

impl std::fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPath")
            .field("repository", &self.fs.key())
            .field("relative", &self.relative)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.fs.key(), self.relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsBackend;
    use depot_schema::RepositoryType;

    fn fs(storage: &str, id: &str, root: &str) -> Arc<VirtualFileSystem> {
        let repo = Repository::new(storage, id, RepositoryType::Hosted);
        VirtualFileSystem::new(Arc::new(repo), root, Arc::new(FsBackend::new()))
    }

    #[test]
    fn equality_requires_same_repository() {
        let a = fs("s", "a", "/srv/shared");
        let b = fs("s", "b", "/srv/shared");
        let pa = a.resolve("x/y.jar").unwrap();
        let pb = b.resolve("x/y.jar").unwrap();
        assert_eq!(pa.target(), pb.target());
        assert_ne!(pa, pb);
        assert_eq!(pa, a.resolve("/x/y.jar").unwrap());
    }

    #[test]
    fn navigation() {
        let fs = fs("s", "a", "/srv/a");
        let path = fs.resolve("org/lib/1.0/lib-1.0.jar").unwrap();
        assert_eq!(path.file_name(), Some("lib-1.0.jar"));
        assert_eq!(path.parent().unwrap().relative(), "org/lib/1.0");
        assert_eq!(path.with_suffix(".sha1").relative(), "org/lib/1.0/lib-1.0.jar.sha1");
        assert!(fs.root().parent().is_none());
        assert_eq!(fs.root().join("org").unwrap().relative(), "org");
        assert!(path.join("../../..").is_err());
        assert!(fs.resolve(".trash/x").unwrap().is_internal());
        assert!(fs.resolve(".upstream/org/lib/maven-metadata.json").unwrap().is_internal());
        assert!(!path.is_internal());
    }
}
