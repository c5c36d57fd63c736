use super::filesystem::VirtualFileSystem;
use crate::storage::{FsBackend, StorageBackend, StorageError};
use depot_schema::{Repository, RepositoryKey};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Lazily created, cached [`VirtualFileSystem`]s, one per repository.
#[derive(Debug)]
pub struct FileSystemRegistry {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
    file_systems: Mutex<HashMap<RepositoryKey, Arc<VirtualFileSystem>>>,
}

impl Default for FileSystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemRegistry {
    /// Registry with the local-disk backend registered.
    pub fn new() -> Self {
        let mut registry = Self {
            backends: HashMap::new(),
            file_systems: Mutex::new(HashMap::new()),
        };
        registry.register_backend(Arc::new(FsBackend::new()));
        registry
    }

    /// Register a backend under its alias, replacing any previous one.
    pub fn register_backend(&mut self, backend: Arc<dyn StorageBackend>) {
        self.backends.insert(backend.alias().to_string(), backend);
    }

    /// The namespace of `repository`, created on first use.
    pub fn file_system(
        &self,
        repository: &Arc<Repository>,
        root: impl FnOnce() -> PathBuf,
    ) -> Result<Arc<VirtualFileSystem>, StorageError> {
        let key = repository.key();
        let mut cache = self
            .file_systems
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(fs) = cache.get(&key) {
            return Ok(Arc::clone(fs));
        }
        let backend = self
            .backends
            .get(&repository.implementation)
            .ok_or_else(|| StorageError::UnknownBackend(repository.implementation.clone()))?;
        let root = root();
        debug!(repository = %key, root = %root.display(), "Created virtual filesystem");
        let fs = VirtualFileSystem::new(Arc::clone(repository), root, Arc::clone(backend));
        cache.insert(key, Arc::clone(&fs));
        Ok(fs)
    }

    /// Discard the cached namespace of an undeployed repository.
    pub fn undeploy(&self, key: &RepositoryKey) -> bool {
        self.file_systems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_schema::RepositoryType;

    #[test]
    fn caches_per_repository() {
        let registry = FileSystemRegistry::new();
        let repo = Arc::new(Repository::new("s", "r", RepositoryType::Hosted));
        let a = registry.file_system(&repo, || PathBuf::from("/srv/r")).unwrap();
        let b = registry
            .file_system(&repo, || PathBuf::from("/elsewhere"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.undeploy(&repo.key()));
        assert!(!registry.undeploy(&repo.key()));
    }

    #[test]
    fn unknown_backend_fails() {
        let registry = FileSystemRegistry::new();
        let mut repo = Repository::new("s", "r", RepositoryType::Hosted);
        repo.implementation = "s3".to_string();
        let err = registry
            .file_system(&Arc::new(repo), || PathBuf::from("/srv/r"))
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownBackend(alias) if alias == "s3"));
    }
}
