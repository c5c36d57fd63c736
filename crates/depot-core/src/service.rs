//! Artifact management: the operations exposed to the CLI and to scheduled
//! maintenance jobs.
//!
//! Every operation addresses artifacts through [`VirtualPath`]s and keeps
//! checksum companions and metadata documents consistent with the files on
//! disk.

use crate::config::{DepotConfig, RepositoryRegistry};
use crate::io::{companion_paths, store_stream, write_companions};
use crate::layout::{ArtifactCoordinates, LayoutProvider};
use crate::metadata::{MetadataError, PruneReport};
use crate::resolve::{ResolutionChain, ResolveError, ResolvedArtifact};
use crate::storage::{ByteStream, StorageError, read_all};
use crate::vfs::{BackendProvider, PathProvider, VirtualFileSystem, VirtualPath};
use depot_schema::{
    ChecksumAlgorithm, DigestMap, Metadata, Repository, RepositoryKey, RepositoryStatus,
    RepositoryType, Versioning,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Facade over the resolution chain and the metadata manager.
#[derive(Debug)]
pub struct ArtifactManagementService {
    chain: ResolutionChain,
}

impl ArtifactManagementService {
    /// Service over an existing registry.
    pub fn new(repositories: Arc<RepositoryRegistry>, checksums: &[ChecksumAlgorithm]) -> Self {
        Self {
            chain: ResolutionChain::new(repositories, checksums),
        }
    }

    /// Service over a loaded configuration, with storages rooted in `home`.
    pub fn from_config(config: DepotConfig, home: &Path) -> Self {
        let checksums = config.checksums.clone();
        Self::new(Arc::new(config.into_registry(home)), &checksums)
    }

    /// The underlying resolution chain.
    pub fn chain(&self) -> &ResolutionChain {
        &self.chain
    }

    /// Every configured repository.
    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.chain.repositories().repositories()
    }

    /// Take a repository in or out of service.
    pub fn set_status(
        &self,
        storage_id: &str,
        repository_id: &str,
        status: RepositoryStatus,
    ) -> Result<(), ResolveError> {
        let key = RepositoryKey::new(storage_id, repository_id);
        if !self.chain.repositories().set_status(&key, status) {
            return Err(ResolveError::RepositoryNotFound(key));
        }
        info!(repository = %key, ?status, "Repository status changed");
        Ok(())
    }

    /// Remove a repository from service entirely and discard its cached
    /// filesystem. Files on disk are left in place.
    pub fn undeploy(
        &self,
        storage_id: &str,
        repository_id: &str,
    ) -> Result<Arc<Repository>, ResolveError> {
        let key = RepositoryKey::new(storage_id, repository_id);
        let removed = self
            .chain
            .repositories()
            .remove(&key)
            .ok_or_else(|| ResolveError::RepositoryNotFound(key.clone()))?;
        self.chain.undeploy(&key);
        info!(repository = %key, "Repository undeployed");
        Ok(removed)
    }

    /// A path in the repository `storage_id:repository_id`.
    pub fn path(
        &self,
        storage_id: &str,
        repository_id: &str,
        relative: &str,
    ) -> Result<VirtualPath, ResolveError> {
        let fs = self.file_system(&RepositoryKey::new(storage_id, repository_id))?;
        Ok(fs.resolve(relative)?)
    }

    fn file_system(&self, key: &RepositoryKey) -> Result<Arc<VirtualFileSystem>, ResolveError> {
        let repository = self.chain.repository(key)?;
        self.chain.file_system(&repository)
    }

    /// Resolve `path` through the repository's strategy.
    pub async fn resolve(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        self.chain.resolve(storage_id, repository_id, path).await
    }

    /// Entry names of a directory; the member union for groups.
    pub async fn list(
        &self,
        storage_id: &str,
        repository_id: &str,
        dir: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let key = RepositoryKey::new(storage_id, repository_id);
        self.chain.list(&key, dir).await
    }

    /// Store an uploaded file into a hosted repository.
    ///
    /// Artifacts get checksum companions and their version recorded in the
    /// artifact-group document; snapshot uploads also regenerate the
    /// version-level document. Uploaded metadata documents are merged into
    /// the existing ones. Returns the digests of the stored bytes.
    pub async fn store(
        &self,
        path: &VirtualPath,
        stream: ByteStream,
    ) -> Result<DigestMap, ResolveError> {
        let key = path.file_system().key();
        let repository = self.chain.repository(&key)?;
        if !repository.is_in_service() {
            return Err(ResolveError::OutOfService(key));
        }
        if repository.repository_type != RepositoryType::Hosted {
            return Err(ResolveError::NotWritable {
                repository: key,
                repository_type: repository.repository_type,
            });
        }
        if path.is_internal() || path.is_root() {
            return Err(ResolveError::ReservedPath(path.to_string()));
        }

        let layout = self.chain.layout(&repository)?;
        let relative = path.relative();
        if layout.is_metadata(relative) {
            return self.store_metadata(path, stream).await;
        }
        if layout.is_metadata_checksum(relative) {
            debug!(path = %path, "Ignoring uploaded metadata checksum");
            read_all(stream)
                .await
                .map_err(|e| StorageError::io(path.target(), e))?;
            return Ok(DigestMap::new());
        }

        let is_checksum = layout.is_checksum(relative);
        let coordinates = if is_checksum {
            None
        } else {
            layout.parse_artifact_path(relative)
        };
        if let Some(coordinates) = &coordinates {
            if !repository.policy.accepts(&coordinates.version) {
                return Err(ResolveError::PolicyViolation {
                    repository: key,
                    version: coordinates.version.clone(),
                    policy: repository.policy,
                });
            }
        }

        let algorithms = if is_checksum { &[][..] } else { self.chain.checksums() };
        let outcome = store_stream(path, stream, algorithms).await?;
        if !is_checksum {
            write_companions(path, &outcome.digests).await?;
        }
        if let Some(coordinates) = &coordinates {
            self.record_version(path.file_system(), layout.as_ref(), coordinates)
                .await?;
        }
        info!(path = %path, size = outcome.size, "Stored");
        Ok(outcome.digests)
    }

    async fn store_metadata(
        &self,
        path: &VirtualPath,
        stream: ByteStream,
    ) -> Result<DigestMap, ResolveError> {
        let bytes = read_all(stream)
            .await
            .map_err(|e| StorageError::io(path.target(), e))?;
        let incoming: Metadata =
            serde_json::from_slice(&bytes).map_err(|source| MetadataError::Parse {
                path: path.to_string(),
                source,
            })?;
        let dir = path
            .parent()
            .unwrap_or_else(|| path.file_system().root());
        self.chain.metadata().merge(&dir, incoming).await?;
        info!(path = %path, "Merged uploaded metadata");
        Ok(DigestMap::new())
    }

    /// Add the artifact's version to its artifact-group document.
    async fn record_version(
        &self,
        fs: &Arc<VirtualFileSystem>,
        layout: &dyn LayoutProvider,
        coordinates: &ArtifactCoordinates,
    ) -> Result<(), ResolveError> {
        let base = fs.resolve(&coordinates.base_path())?;
        let incoming = Metadata {
            group_id: Some(coordinates.group_id()).filter(|g| !g.is_empty()),
            artifact_id: Some(coordinates.artifact_id.clone()),
            version: None,
            versioning: Versioning {
                versions: vec![coordinates.version.clone()],
                ..Versioning::default()
            },
        };
        self.chain.metadata().merge(&base, incoming).await?;
        if layout.is_snapshot_version(&coordinates.version) {
            let version_dir = fs.resolve(&coordinates.version_path())?;
            self.chain
                .metadata()
                .generate_version_level(&version_dir)
                .await?;
        }
        Ok(())
    }

    /// Delete a file or directory, with its checksum companions.
    ///
    /// Goes to trash when the repository has trash enabled, unless `force`
    /// is set; forced deletes also drop any existing trash entry and require
    /// `allows_force_deletion`. Deleting a version directory removes the
    /// version from the artifact-group document. Returns false if nothing
    /// was there.
    pub async fn delete(&self, path: &VirtualPath, force: bool) -> Result<bool, ResolveError> {
        let key = path.file_system().key();
        let repository = self.chain.repository(&key)?;
        if force && !repository.allows_force_deletion {
            return Err(ResolveError::ForceDeletionDenied(key));
        }
        if path.is_internal() || path.is_root() {
            return Err(ResolveError::ReservedPath(path.to_string()));
        }
        let Some(attributes) = BackendProvider.attributes(path).await? else {
            debug!(path = %path, "Nothing to delete");
            return Ok(false);
        };

        let layout = self.chain.layout(&repository)?;
        let mut targets = vec![path.clone()];
        if !attributes.is_dir && !layout.is_checksum(path.relative()) {
            targets.extend(companion_paths(path));
        }
        let provider = self.chain.metadata().provider();
        for target in &targets {
            if force {
                provider.delegate().delete(target).await?;
                provider.delete_trash(target).await?;
            } else {
                provider.delete(target).await?;
            }
        }
        info!(path = %path, force, "Deleted");

        if attributes.is_dir {
            self.forget_version_dir(path).await?;
        } else {
            self.refresh_builds(path, layout.as_ref()).await?;
        }
        Ok(true)
    }

    /// Drop a deleted version directory from its artifact-group document.
    async fn forget_version_dir(&self, dir: &VirtualPath) -> Result<(), ResolveError> {
        let (Some(base), Some(version)) = (dir.parent(), dir.file_name()) else {
            return Ok(());
        };
        if self.chain.metadata().remove_version(&base, version).await?.is_none() {
            debug!(dir = %dir, "No artifact-group document to update");
        }
        Ok(())
    }

    /// Regenerate the version-level document after a snapshot build file
    /// appeared or disappeared.
    async fn refresh_builds(
        &self,
        path: &VirtualPath,
        layout: &dyn LayoutProvider,
    ) -> Result<(), ResolveError> {
        if layout.is_checksum(path.relative()) || layout.is_metadata(path.relative()) {
            return Ok(());
        }
        let Some(coordinates) = layout.parse_artifact_path(path.relative()) else {
            return Ok(());
        };
        if layout.is_snapshot_version(&coordinates.version) {
            let version_dir = path.file_system().resolve(&coordinates.version_path())?;
            self.chain
                .metadata()
                .generate_version_level(&version_dir)
                .await?;
        }
        Ok(())
    }

    /// Restore a trashed file or directory, with its checksum companions.
    /// Returns false if there was no trash entry.
    pub async fn restore(&self, path: &VirtualPath) -> Result<bool, ResolveError> {
        let key = path.file_system().key();
        let repository = self.chain.repository(&key)?;
        let provider = self.chain.metadata().provider();
        if !provider.restore_trash(path).await? {
            debug!(path = %path, "Nothing to restore");
            return Ok(false);
        }
        for companion in companion_paths(path) {
            provider.restore_trash(&companion).await?;
        }

        let layout = self.chain.layout(&repository)?;
        let is_dir = BackendProvider
            .attributes(path)
            .await?
            .is_some_and(|a| a.is_dir);
        if is_dir {
            self.remember_version_dir(path).await?;
        } else if let Some(coordinates) = layout.parse_artifact_path(path.relative()) {
            if !layout.is_checksum(path.relative()) {
                self.record_version(path.file_system(), layout.as_ref(), &coordinates)
                    .await?;
            }
        }
        Ok(true)
    }

    /// Re-add a restored version directory to an existing artifact-group
    /// document.
    async fn remember_version_dir(&self, dir: &VirtualPath) -> Result<(), ResolveError> {
        let (Some(base), Some(version)) = (dir.parent(), dir.file_name()) else {
            return Ok(());
        };
        let metadata = self.chain.metadata();
        let Some(existing) = metadata.load(&base).await? else {
            return Ok(());
        };
        let incoming = Metadata {
            versioning: Versioning {
                versions: vec![version.to_string()],
                ..Versioning::default()
            },
            ..existing
        };
        metadata.merge(&base, incoming).await?;
        Ok(())
    }

    /// Restore every trash entry of a repository and record the versions
    /// of the restored artifacts. Returns the number of files restored.
    pub async fn restore_all(
        &self,
        storage_id: &str,
        repository_id: &str,
    ) -> Result<usize, ResolveError> {
        let repository = self
            .chain
            .repository(&RepositoryKey::new(storage_id, repository_id))?;
        let fs = self.chain.file_system(&repository)?;
        let layout = self.chain.layout(&repository)?;
        let restored = self.chain.metadata().provider().restore_all(&fs).await?;

        let mut recorded = BTreeSet::new();
        for path in &restored {
            let relative = path.relative();
            if layout.is_checksum(relative) || layout.is_metadata(relative) {
                continue;
            }
            let Some(coordinates) = layout.parse_artifact_path(relative) else {
                continue;
            };
            if recorded.insert(coordinates.version_path()) {
                self.record_version(&fs, layout.as_ref(), &coordinates)
                    .await?;
            }
        }
        Ok(restored.len())
    }

    /// Permanently remove a repository's trash.
    pub async fn empty_trash(
        &self,
        storage_id: &str,
        repository_id: &str,
    ) -> Result<bool, ResolveError> {
        let fs = self.file_system(&RepositoryKey::new(storage_id, repository_id))?;
        Ok(self.chain.metadata().provider().empty_trash(&fs).await?)
    }

    /// Regenerate the metadata documents under an artifact-group base path
    /// from the files on disk.
    pub async fn generate_metadata(&self, base: &VirtualPath) -> Result<Metadata, ResolveError> {
        Ok(self.chain.metadata().generate_metadata(base).await?)
    }

    /// Remove old snapshot builds from a hosted snapshot repository.
    pub async fn prune_snapshots(
        &self,
        storage_id: &str,
        repository_id: &str,
        number_to_keep: usize,
        keep_period_days: u32,
    ) -> Result<PruneReport, ResolveError> {
        let key = RepositoryKey::new(storage_id, repository_id);
        let repository = self.chain.repository(&key)?;
        if repository.repository_type != RepositoryType::Hosted {
            warn!(repository = %key, "Snapshot pruning applies to hosted repositories only");
            return Err(ResolveError::NotWritable {
                repository: key,
                repository_type: repository.repository_type,
            });
        }
        let fs = self.chain.file_system(&repository)?;
        Ok(self
            .chain
            .metadata()
            .prune_snapshots(&fs, number_to_keep, keep_period_days)
            .await?)
    }
}
