//! Metadata Manager: generation, merge, expiration and snapshot retention
//! of artifact metadata documents.
//!
//! Every read-modify-write of a document happens under the write lock of
//! the document's directory in the [`PathLockRegistry`], and every write
//! replaces the whole document through the atomic writer.

mod expiration;
mod merge;
mod retention;

pub use merge::{merge_documents, sort_versions};
pub use retention::PruneReport;

use crate::io::{store_bytes, write_companions};
use crate::layout::{LayoutProvider, LayoutRegistry};
use crate::lock::PathLockRegistry;
use crate::storage::{StorageError, read_all};
use crate::vfs::{BackendProvider, PathProvider, TrashAwareProvider, VirtualPath};
use depot_schema::version::LAST_UPDATED_FORMAT;
use depot_schema::{
    ChecksumAlgorithm, Metadata, RepositoryPolicy, Snapshot, SnapshotBuild, SnapshotVersion,
    Versioning,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by the Metadata Manager.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Reading or writing a document failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An existing document is malformed.
    #[error("Malformed metadata at {path}: {source}")]
    Parse {
        /// Document location.
        path: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// The repository policy has no metadata semantics.
    #[error("Metadata generation is not supported for {0} repositories")]
    UnsupportedPolicy(RepositoryPolicy),

    /// Encoding a document failed.
    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The repository references a layout nobody registered.
    #[error("Unknown layout: {0}")]
    UnknownLayout(String),
}

/// Outcome of reading a document that may be missing or unreadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataRead {
    /// A well-formed document was found.
    Existing(Metadata),
    /// No usable document: missing, unreadable or malformed.
    Absent,
}

impl MetadataRead {
    /// The document, if one was read.
    pub fn into_option(self) -> Option<Metadata> {
        match self {
            Self::Existing(doc) => Some(doc),
            Self::Absent => None,
        }
    }
}

/// Versions found below an artifact-group directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCollection {
    /// Version directory names, unordered.
    pub versions: Vec<String>,
    /// Timestamped build files per `-SNAPSHOT` version.
    pub snapshots: BTreeMap<String, Vec<SnapshotVersion>>,
}

impl VersionCollection {
    /// Collection of plain versions without build information.
    pub fn from_versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
            snapshots: BTreeMap::new(),
        }
    }
}

/// Current time in the `lastUpdated` format.
pub fn timestamp_now() -> String {
    chrono::Utc::now().format(LAST_UPDATED_FORMAT).to_string()
}

/// Generates, merges and expires metadata documents.
#[derive(Debug, Clone)]
pub struct MetadataManager {
    locks: &'static PathLockRegistry,
    provider: TrashAwareProvider,
    layouts: Arc<LayoutRegistry>,
    checksums: Vec<ChecksumAlgorithm>,
}

impl MetadataManager {
    /// Manager using the process-wide lock registry.
    pub fn new(layouts: Arc<LayoutRegistry>, checksums: &[ChecksumAlgorithm]) -> Self {
        Self {
            locks: PathLockRegistry::global(),
            provider: TrashAwareProvider::new(),
            layouts,
            checksums: checksums.to_vec(),
        }
    }

    /// Layout of the repository owning `path`.
    pub fn layout(&self, path: &VirtualPath) -> Result<Arc<dyn LayoutProvider>, MetadataError> {
        let id = &path.repository().layout;
        self.layouts
            .get(id)
            .ok_or_else(|| MetadataError::UnknownLayout(id.clone()))
    }

    /// Location of the document describing directory `dir`.
    pub fn document_path(&self, dir: &VirtualPath) -> Result<VirtualPath, MetadataError> {
        let layout = self.layout(dir)?;
        Ok(dir.join(layout.metadata_file_name())?)
    }

    /// Read the document of `dir`, failing on malformed content.
    pub async fn load(&self, dir: &VirtualPath) -> Result<Option<Metadata>, MetadataError> {
        let path = self.document_path(dir)?;
        let stream = match BackendProvider.open_read(&path).await {
            Ok(stream) => stream,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = read_all(stream)
            .await
            .map_err(|e| StorageError::io(path.target(), e))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| MetadataError::Parse {
                path: path.to_string(),
                source,
            })
    }

    /// Read the document of `dir`, treating every failure as absence.
    pub async fn read(&self, dir: &VirtualPath) -> MetadataRead {
        match self.load(dir).await {
            Ok(Some(doc)) => MetadataRead::Existing(doc),
            Ok(None) => MetadataRead::Absent,
            Err(e) => {
                warn!(dir = %dir, error = %e, "Unreadable metadata, treating as absent");
                MetadataRead::Absent
            }
        }
    }

    /// Replace the document of `dir` and its checksum companions.
    ///
    /// Callers must hold the write lock of `dir`.
    async fn write_unlocked(&self, dir: &VirtualPath, doc: &Metadata) -> Result<(), MetadataError> {
        let path = self.document_path(dir)?;
        let bytes = serde_json::to_vec_pretty(doc).map_err(MetadataError::Serialize)?;
        let outcome = store_bytes(&path, bytes, &self.checksums).await?;
        write_companions(&path, &outcome.digests).await?;
        debug!(path = %path, versions = doc.versioning.versions.len(), "Wrote metadata");
        Ok(())
    }

    /// Replace the document of `dir` under its write lock.
    pub async fn replace(&self, dir: &VirtualPath, doc: &Metadata) -> Result<(), MetadataError> {
        let lock = self.locks.lock_path(dir);
        let _guard = lock.write().await;
        self.write_unlocked(dir, doc).await
    }

    /// Build and write documents from an already collected version list.
    ///
    /// Release repositories get one artifact-group document. Snapshot
    /// repositories additionally get one version-level document per
    /// snapshot version with build information.
    pub async fn generate(
        &self,
        base: &VirtualPath,
        collection: &VersionCollection,
        policy: RepositoryPolicy,
    ) -> Result<Metadata, MetadataError> {
        if policy == RepositoryPolicy::Mixed {
            return Err(MetadataError::UnsupportedPolicy(policy));
        }
        let layout = self.layout(base)?;
        let (group_id, artifact_id) = layout.base_coordinates(base.relative());

        let mut doc = Metadata {
            group_id: group_id.clone(),
            artifact_id: artifact_id.clone(),
            version: None,
            versioning: Versioning {
                versions: collection.versions.clone(),
                last_updated: Some(timestamp_now()),
                ..Versioning::default()
            },
        };
        sort_versions(&mut doc.versioning.versions, layout.as_ref());
        apply_pointers(&mut doc.versioning, layout.as_ref());
        self.replace(base, &doc).await?;

        if policy == RepositoryPolicy::Snapshot {
            for (version, builds) in &collection.snapshots {
                let dir = base.join(version)?;
                let version_doc = version_document(
                    group_id.clone(),
                    artifact_id.clone(),
                    version,
                    builds.clone(),
                );
                self.replace(&dir, &version_doc).await?;
            }
        }
        info!(base = %base, versions = doc.versioning.versions.len(), %policy, "Generated metadata");
        Ok(doc)
    }

    /// Collect versions by listing the version directories below `base`.
    pub async fn collect_versions(&self, base: &VirtualPath) -> Result<VersionCollection, MetadataError> {
        let layout = self.layout(base)?;
        let mut collection = VersionCollection::default();
        for child in BackendProvider.list(base).await? {
            let Some(name) = child.file_name() else {
                continue;
            };
            if name.starts_with('.') || child.is_internal() {
                continue;
            }
            let is_dir = BackendProvider
                .attributes(&child)
                .await?
                .is_some_and(|a| a.is_dir);
            if !is_dir {
                continue;
            }
            let version = name.to_string();
            if layout.is_snapshot_version(&version) {
                let builds = self.collect_builds(&child, layout.as_ref()).await?;
                collection.snapshots.insert(version.clone(), builds);
            }
            collection.versions.push(version);
        }
        Ok(collection)
    }

    /// Timestamped build files of one snapshot version directory.
    async fn collect_builds(
        &self,
        version_dir: &VirtualPath,
        layout: &dyn LayoutProvider,
    ) -> Result<Vec<SnapshotVersion>, MetadataError> {
        let mut builds = Vec::new();
        for file in BackendProvider.list(version_dir).await? {
            let relative = file.relative();
            if layout.is_checksum(relative) || layout.is_metadata(relative) {
                continue;
            }
            let Some(coordinates) = layout.parse_artifact_path(relative) else {
                continue;
            };
            let Some(build) = SnapshotBuild::parse(&coordinates.file_version) else {
                continue;
            };
            builds.push(SnapshotVersion {
                classifier: coordinates.classifier,
                extension: coordinates.extension,
                value: build.version(),
                updated: Some(build.timestamp.replace('.', "")),
            });
        }
        Ok(builds)
    }

    /// Regenerate the documents below `base` from what is on disk.
    pub async fn generate_metadata(&self, base: &VirtualPath) -> Result<Metadata, MetadataError> {
        let collection = self.collect_versions(base).await?;
        let policy = base.repository().policy;
        self.generate(base, &collection, policy).await
    }

    /// Regenerate the version-level document of one snapshot version
    /// directory from its build files.
    ///
    /// The directory is listed under its write lock, so the document written
    /// last always reflects every build present when it was written.
    pub async fn generate_version_level(
        &self,
        version_dir: &VirtualPath,
    ) -> Result<Metadata, MetadataError> {
        let layout = self.layout(version_dir)?;
        let version = version_dir.file_name().unwrap_or_default().to_string();
        let base = version_dir.parent().unwrap_or_else(|| version_dir.clone());
        let (group_id, artifact_id) = layout.base_coordinates(base.relative());

        let lock = self.locks.lock_path(version_dir);
        let _guard = lock.write().await;
        let builds = self.collect_builds(version_dir, layout.as_ref()).await?;
        let doc = version_document(group_id, artifact_id, &version, builds);
        self.write_unlocked(version_dir, &doc).await?;
        Ok(doc)
    }

    /// Drop `version` from the artifact-group document of `base` and
    /// re-derive the pointers. Returns the new document, or `None` if
    /// there was no document.
    pub async fn remove_version(
        &self,
        base: &VirtualPath,
        version: &str,
    ) -> Result<Option<Metadata>, MetadataError> {
        let layout = self.layout(base)?;
        let lock = self.locks.lock_path(base);
        let _guard = lock.write().await;
        let MetadataRead::Existing(mut doc) = self.read(base).await else {
            return Ok(None);
        };
        doc.versioning.versions.retain(|v| v != version);
        doc.versioning.latest = None;
        doc.versioning.release = None;
        apply_pointers(&mut doc.versioning, layout.as_ref());
        doc.versioning.last_updated = Some(timestamp_now());
        self.write_unlocked(base, &doc).await?;
        info!(base = %base, version, "Removed version from metadata");
        Ok(Some(doc))
    }

    pub(crate) fn provider(&self) -> &TrashAwareProvider {
        &self.provider
    }

    pub(crate) fn locks(&self) -> &'static PathLockRegistry {
        self.locks
    }
}

/// Set `latest` and `release` to the highest versions of the list, keeping
/// any higher pointer already present.
pub(crate) fn apply_pointers(versioning: &mut Versioning, layout: &dyn LayoutProvider) {
    let higher = |current: Option<String>, candidate: Option<&String>| match (current, candidate) {
        (Some(c), Some(n)) if layout.compare_versions(n, &c).is_gt() => Some(n.clone()),
        (None, Some(n)) => Some(n.clone()),
        (current, _) => current,
    };
    let latest = versioning
        .versions
        .iter()
        .max_by(|a, b| layout.compare_versions(a, b));
    let release = versioning
        .versions
        .iter()
        .filter(|v| !layout.is_snapshot_version(v))
        .max_by(|a, b| layout.compare_versions(a, b));
    versioning.latest = higher(versioning.latest.take(), latest);
    versioning.release = higher(versioning.release.take(), release);
}

/// Version-level document summarizing the builds of one snapshot version.
fn version_document(
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: &str,
    mut builds: Vec<SnapshotVersion>,
) -> Metadata {
    merge::sort_snapshot_versions(&mut builds);
    let snapshot = builds
        .iter()
        .filter_map(|b| SnapshotBuild::parse(&b.value))
        .max_by(depot_schema::version::compare_snapshot_builds)
        .map(|b| Snapshot {
            timestamp: b.timestamp,
            build_number: b.build_number,
        });
    Metadata {
        group_id,
        artifact_id,
        version: Some(version.to_string()),
        versioning: Versioning {
            snapshot,
            snapshot_versions: builds,
            last_updated: Some(timestamp_now()),
            ..Versioning::default()
        },
    }
}
