//! Repository Resolution Chain.
//!
//! A request `(storage, repository, path)` enters [`ResolutionChain::resolve`]
//! and is answered by the strategy for the repository's type:
//!
//! - [`HostedResolver`]: local lookup only.
//! - [`ProxyResolver`]: local cache, else fetch from the remote through the
//!   atomic writer; stale cache on transport failure.
//! - [`GroupResolver`]: members in order after routing rules, first hit
//!   wins; metadata is merged across all eligible members.
//!
//! Not-found is `Ok(None)` at every level.

mod group;
mod hosted;
mod proxy;
mod routing;

pub use group::GroupResolver;
pub use hosted::HostedResolver;
pub use proxy::ProxyResolver;
pub use routing::{MemberFilter, ResolutionScope};

use crate::config::RepositoryRegistry;
use crate::layout::{LayoutProvider, LayoutRegistry};
use crate::metadata::{MetadataError, MetadataManager};
use crate::remote::{RemoteRegistry, TransportError};
use crate::storage::{ByteStream, FileAttributes, StorageError, read_all};
use crate::vfs::{BackendProvider, FileSystemRegistry, PathProvider, VirtualFileSystem, VirtualPath};
use async_trait::async_trait;
use depot_schema::{
    ChecksumAlgorithm, Metadata, Repository, RepositoryKey, RepositoryPolicy, RepositoryType,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by resolution and by the operations built on it.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Remote failure with no cached copy to fall back to.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Metadata generation or merge failure.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// No repository is configured under the key.
    #[error("Repository not found: {0}")]
    RepositoryNotFound(RepositoryKey),

    /// The repository was addressed directly while out of service.
    #[error("Repository {0} is out of service")]
    OutOfService(RepositoryKey),

    /// The repository references a layout nobody registered.
    #[error("Unknown layout: {0}")]
    UnknownLayout(String),

    /// A forced delete was requested on a repository that forbids it.
    #[error("Repository {0} does not allow forced deletion")]
    ForceDeletionDenied(RepositoryKey),

    /// The version does not fit the repository policy.
    #[error("Version {version} is not allowed in {policy} repository {repository}")]
    PolicyViolation {
        /// Target repository.
        repository: RepositoryKey,
        /// Rejected version.
        version: String,
        /// Repository policy.
        policy: RepositoryPolicy,
    },

    /// The path lies in the repository's `.trash` or `.temp` area.
    #[error("Path {0} is reserved for internal use")]
    ReservedPath(String),

    /// Only hosted repositories accept uploads.
    #[error("Repository {repository} is a {repository_type} repository and cannot be written to")]
    NotWritable {
        /// Target repository.
        repository: RepositoryKey,
        /// Its type.
        repository_type: RepositoryType,
    },
}

/// A readable artifact found by resolution.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    path: VirtualPath,
    attributes: FileAttributes,
}

impl ResolvedArtifact {
    /// Location of the bytes; may belong to a member of the addressed group.
    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.attributes.size
    }

    /// File attributes at resolution time.
    pub fn attributes(&self) -> &FileAttributes {
        &self.attributes
    }

    /// Open the artifact for reading.
    pub async fn open(&self) -> Result<ByteStream, StorageError> {
        BackendProvider.open_read(&self.path).await
    }

    /// Read the whole artifact into memory.
    pub async fn read_to_vec(&self) -> Result<Vec<u8>, StorageError> {
        read_all(self.open().await?)
            .await
            .map_err(|e| StorageError::io(self.path.target(), e))
    }
}

/// One resolution strategy.
#[async_trait]
pub trait RepositoryResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `path` in `repository`.
    async fn resolve(
        &self,
        chain: &ResolutionChain,
        repository: &Arc<Repository>,
        path: &str,
        scope: &ResolutionScope,
    ) -> Result<Option<ResolvedArtifact>, ResolveError>;
}

/// Dispatches requests to the strategy of each repository type.
#[derive(Debug)]
pub struct ResolutionChain {
    repositories: Arc<RepositoryRegistry>,
    file_systems: FileSystemRegistry,
    layouts: Arc<LayoutRegistry>,
    metadata: MetadataManager,
    remotes: RemoteRegistry,
    checksums: Vec<ChecksumAlgorithm>,
}

impl ResolutionChain {
    /// Chain over `repositories`, computing `checksums` for cached files.
    pub fn new(repositories: Arc<RepositoryRegistry>, checksums: &[ChecksumAlgorithm]) -> Self {
        Self::with_file_systems(repositories, FileSystemRegistry::new(), checksums)
    }

    /// Chain with a preconfigured set of storage backends.
    pub fn with_file_systems(
        repositories: Arc<RepositoryRegistry>,
        file_systems: FileSystemRegistry,
        checksums: &[ChecksumAlgorithm],
    ) -> Self {
        let layouts = Arc::new(LayoutRegistry::new());
        Self {
            repositories,
            file_systems,
            metadata: MetadataManager::new(Arc::clone(&layouts), checksums),
            layouts,
            remotes: RemoteRegistry::new(),
            checksums: checksums.to_vec(),
        }
    }

    /// Configured repositories.
    pub fn repositories(&self) -> &Arc<RepositoryRegistry> {
        &self.repositories
    }

    /// The Metadata Manager.
    pub fn metadata(&self) -> &MetadataManager {
        &self.metadata
    }

    /// Remote resolvers of proxy repositories.
    pub fn remotes(&self) -> &RemoteRegistry {
        &self.remotes
    }

    /// Digests computed for stored files.
    pub fn checksums(&self) -> &[ChecksumAlgorithm] {
        &self.checksums
    }

    /// Look up a repository.
    pub fn repository(&self, key: &RepositoryKey) -> Result<Arc<Repository>, ResolveError> {
        self.repositories
            .get(key)
            .ok_or_else(|| ResolveError::RepositoryNotFound(key.clone()))
    }

    /// Virtual filesystem of a repository, created on first use.
    pub fn file_system(
        &self,
        repository: &Arc<Repository>,
    ) -> Result<Arc<VirtualFileSystem>, ResolveError> {
        Ok(self
            .file_systems
            .file_system(repository, || self.repositories.root(repository))?)
    }

    /// Drop the cached filesystem of an undeployed repository.
    pub fn undeploy(&self, key: &RepositoryKey) -> bool {
        self.file_systems.undeploy(key)
    }

    /// Layout of a repository.
    pub fn layout(&self, repository: &Repository) -> Result<Arc<dyn LayoutProvider>, ResolveError> {
        self.layouts
            .get(&repository.layout)
            .ok_or_else(|| ResolveError::UnknownLayout(repository.layout.clone()))
    }

    fn strategy(repository_type: RepositoryType) -> &'static dyn RepositoryResolver {
        match repository_type {
            RepositoryType::Hosted => &HostedResolver,
            RepositoryType::Proxy => &ProxyResolver,
            RepositoryType::Group => &GroupResolver,
        }
    }

    /// Resolve `path` in the repository `storage_id:repository_id`.
    pub async fn resolve(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let key = RepositoryKey::new(storage_id, repository_id);
        self.resolve_in(&key, path, &ResolutionScope::default()).await
    }

    /// Resolve `path` in `key` within an enclosing group scope.
    pub async fn resolve_in(
        &self,
        key: &RepositoryKey,
        path: &str,
        scope: &ResolutionScope,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let repository = self.repository(key)?;
        if !repository.is_in_service() {
            return Err(ResolveError::OutOfService(key.clone()));
        }
        debug!(repository = %key, path, kind = %repository.repository_type, "Resolving");
        Self::strategy(repository.repository_type)
            .resolve(self, &repository, path, scope)
            .await
    }

    /// A regular file at `path`, if present. Internal paths never resolve.
    pub(crate) async fn local_file(
        &self,
        path: &VirtualPath,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        if path.is_internal() || path.is_root() {
            return Ok(None);
        }
        match BackendProvider.attributes(path).await? {
            Some(attributes) if !attributes.is_dir => Ok(Some(ResolvedArtifact {
                path: path.clone(),
                attributes,
            })),
            _ => Ok(None),
        }
    }

    /// Parse a resolved metadata document; malformed documents are skipped.
    pub(crate) async fn read_document(&self, artifact: &ResolvedArtifact) -> Option<Metadata> {
        let bytes = match artifact.read_to_vec().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %artifact.path(), error = %e, "Unreadable metadata");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(path = %artifact.path(), error = %e, "Malformed metadata, skipped");
                None
            }
        }
    }

    /// Names of the entries of directory `dir` in `key`; for groups the
    /// union over every eligible member.
    pub async fn list(&self, key: &RepositoryKey, dir: &str) -> Result<Vec<String>, ResolveError> {
        let names = self.list_in(key.clone(), dir.to_string(), ResolutionScope::default()).await?;
        Ok(names.into_iter().collect())
    }

    fn list_in(
        &self,
        key: RepositoryKey,
        dir: String,
        scope: ResolutionScope,
    ) -> BoxFuture<'_, Result<BTreeSet<String>, ResolveError>> {
        async move {
            let repository = self.repository(&key)?;
            if !repository.is_in_service() {
                return Err(ResolveError::OutOfService(key));
            }
            if repository.repository_type != RepositoryType::Group {
                let fs = self.file_system(&repository)?;
                let dir = fs.resolve(&dir)?;
                if dir.is_internal() {
                    return Ok(BTreeSet::new());
                }
                return Ok(BackendProvider
                    .list(&dir)
                    .await?
                    .into_iter()
                    .filter(|p| !p.is_internal())
                    .filter_map(|p| p.file_name().map(str::to_string))
                    .collect());
            }

            let filter = MemberFilter::for_path(&repository, &dir);
            let inner = scope.enter(&key, &filter);
            let mut names = BTreeSet::new();
            for member in group::eligible_members(self, &repository, &dir, &scope, &filter) {
                match self.list_in(member.clone(), dir.clone(), inner.clone()).await {
                    Ok(found) => names.extend(found),
                    Err(e) => warn!(group = %key, member = %member, error = %e, "Member listing failed"),
                }
            }
            Ok(names)
        }
        .boxed()
    }
}
