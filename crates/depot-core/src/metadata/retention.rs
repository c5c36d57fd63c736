use super::{MetadataError, MetadataManager, MetadataRead, version_document};
use crate::layout::LayoutProvider;
use crate::vfs::{BackendProvider, PathProvider, VirtualFileSystem, VirtualPath};
use chrono::{Duration, Utc};
use depot_schema::version::compare_snapshot_builds;
use depot_schema::{RepositoryPolicy, SnapshotBuild};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What a snapshot pruning run removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Version-level documents inspected.
    pub documents: usize,
    /// Timestamped build versions removed, e.g. `1.0-20240101.120000-1`.
    pub removed_builds: Vec<String>,
    /// Files removed, checksum companions included.
    pub removed_files: usize,
}

impl MetadataManager {
    /// Remove old snapshot builds from every snapshot version of a
    /// repository.
    ///
    /// With `number_to_keep > 0` only that many most recent builds (by build
    /// number) survive; otherwise with `keep_period_days > 0` only builds
    /// newer than that survive. Files are deleted through the trash-aware
    /// provider, then each version-level document is rewritten without the
    /// removed builds.
    pub async fn prune_snapshots(
        &self,
        fs: &Arc<VirtualFileSystem>,
        number_to_keep: usize,
        keep_period_days: u32,
    ) -> Result<PruneReport, MetadataError> {
        let policy = fs.repository().policy;
        if policy != RepositoryPolicy::Snapshot {
            return Err(MetadataError::UnsupportedPolicy(policy));
        }
        let layout = self.layout(&fs.root())?;
        let mut report = PruneReport::default();
        if number_to_keep == 0 && keep_period_days == 0 {
            return Ok(report);
        }

        let mut pending = vec![fs.root()];
        while let Some(dir) = pending.pop() {
            for child in BackendProvider.list(&dir).await? {
                if child.is_internal() {
                    continue;
                }
                let is_dir = BackendProvider
                    .attributes(&child)
                    .await?
                    .is_some_and(|a| a.is_dir);
                if !is_dir {
                    continue;
                }
                let is_snapshot = child
                    .file_name()
                    .is_some_and(|name| layout.is_snapshot_version(name));
                if is_snapshot {
                    let keep = (number_to_keep, keep_period_days);
                    self.prune_version(&child, layout.as_ref(), keep, &mut report)
                        .await?;
                } else {
                    pending.push(child);
                }
            }
        }
        info!(
            repository = %fs.key(),
            documents = report.documents,
            builds = report.removed_builds.len(),
            files = report.removed_files,
            "Pruned snapshots"
        );
        Ok(report)
    }

    async fn prune_version(
        &self,
        version_dir: &VirtualPath,
        layout: &dyn LayoutProvider,
        (number_to_keep, keep_period_days): (usize, u32),
        report: &mut PruneReport,
    ) -> Result<(), MetadataError> {
        let lock = self.locks().lock_path(version_dir);
        let _guard = lock.write().await;
        let MetadataRead::Existing(doc) = self.read(version_dir).await else {
            return Ok(());
        };
        report.documents += 1;

        let mut builds: Vec<SnapshotBuild> = doc
            .versioning
            .snapshot_versions
            .iter()
            .filter_map(|v| SnapshotBuild::parse(&v.value))
            .collect();
        builds.sort_by(|a, b| compare_snapshot_builds(b, a));
        builds.dedup();

        let removed: HashSet<String> = if number_to_keep > 0 {
            builds.iter().skip(number_to_keep).map(SnapshotBuild::version).collect()
        } else {
            let cutoff = (Utc::now() - Duration::days(i64::from(keep_period_days))).naive_utc();
            builds
                .iter()
                .filter(|b| b.datetime().is_some_and(|at| at < cutoff))
                .map(SnapshotBuild::version)
                .collect()
        };
        if removed.is_empty() {
            return Ok(());
        }

        for file in BackendProvider.list(version_dir).await? {
            let Some(coordinates) = layout.parse_artifact_path(file.relative()) else {
                continue;
            };
            if removed.contains(&coordinates.file_version) && self.provider().delete(&file).await? {
                debug!(path = %file, "Pruned snapshot file");
                report.removed_files += 1;
            }
        }

        let remaining = doc
            .versioning
            .snapshot_versions
            .into_iter()
            .filter(|v| !removed.contains(&v.value))
            .collect();
        let version = doc
            .version
            .unwrap_or_else(|| version_dir.file_name().unwrap_or_default().to_string());
        let rewritten = version_document(doc.group_id, doc.artifact_id, &version, remaining);
        self.write_unlocked(version_dir, &rewritten).await?;

        let mut removed: Vec<String> = removed.into_iter().collect();
        removed.sort();
        report.removed_builds.extend(removed);
        Ok(())
    }
}
