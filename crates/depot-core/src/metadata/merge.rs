use super::{MetadataError, MetadataManager, apply_pointers, timestamp_now};
use crate::layout::LayoutProvider;
use crate::vfs::VirtualPath;
use depot_schema::version::compare_snapshot_builds;
use depot_schema::{Metadata, SnapshotBuild, SnapshotVersion};
use std::cmp::Ordering;
use tracing::debug;

/// Sort and de-duplicate versions by the layout comparator.
pub fn sort_versions(versions: &mut Vec<String>, layout: &dyn LayoutProvider) {
    versions.sort_by(|a, b| layout.compare_versions(a, b).then_with(|| a.cmp(b)));
    versions.dedup();
}

fn compare_snapshot_versions(a: &SnapshotVersion, b: &SnapshotVersion) -> Ordering {
    let builds = match (SnapshotBuild::parse(&a.value), SnapshotBuild::parse(&b.value)) {
        (Some(x), Some(y)) => compare_snapshot_builds(&x, &y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => a.value.cmp(&b.value),
    };
    builds
        .then_with(|| a.extension.cmp(&b.extension))
        .then_with(|| a.classifier.cmp(&b.classifier))
}

/// Order build descriptors oldest build first.
pub(crate) fn sort_snapshot_versions(entries: &mut Vec<SnapshotVersion>) {
    entries.sort_by(compare_snapshot_versions);
    // One entry per file; the later `updated` stamp wins.
    let mut deduped: Vec<SnapshotVersion> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        let same_file = |e: &&mut SnapshotVersion| {
            e.value == entry.value
                && e.extension == entry.extension
                && e.classifier == entry.classifier
        };
        match deduped.iter_mut().find(same_file) {
            Some(existing) => {
                if entry.updated > existing.updated {
                    *existing = entry;
                }
            }
            None => deduped.push(entry),
        }
    }
    *entries = deduped;
}

/// Union `incoming` into `existing`.
///
/// Versions are de-duplicated and re-sorted by the layout comparator, build
/// descriptors by the snapshot comparator, pointers only ever move up, and
/// `lastUpdated` is set to `now`.
pub fn merge_documents(
    existing: Option<Metadata>,
    incoming: Metadata,
    layout: &dyn LayoutProvider,
    now: String,
) -> Metadata {
    let Some(mut merged) = existing else {
        let mut doc = incoming;
        sort_versions(&mut doc.versioning.versions, layout);
        sort_snapshot_versions(&mut doc.versioning.snapshot_versions);
        apply_pointers(&mut doc.versioning, layout);
        doc.versioning.last_updated = Some(now);
        return doc;
    };

    merged.group_id = merged.group_id.or(incoming.group_id);
    merged.artifact_id = merged.artifact_id.or(incoming.artifact_id);
    merged.version = merged.version.or(incoming.version);

    let ours = &mut merged.versioning;
    let theirs = incoming.versioning;

    ours.versions.extend(theirs.versions);
    sort_versions(&mut ours.versions, layout);

    ours.snapshot_versions.extend(theirs.snapshot_versions);
    sort_snapshot_versions(&mut ours.snapshot_versions);

    ours.snapshot = match (ours.snapshot.take(), theirs.snapshot) {
        (Some(a), Some(b)) => {
            let newer = (b.build_number, &b.timestamp) > (a.build_number, &a.timestamp);
            Some(if newer { b } else { a })
        }
        (a, b) => a.or(b),
    };

    for pointer in [theirs.latest, theirs.release].into_iter().flatten() {
        if !ours.versions.contains(&pointer) {
            ours.versions.push(pointer);
        }
    }
    sort_versions(&mut ours.versions, layout);
    apply_pointers(ours, layout);
    ours.last_updated = Some(now);
    merged
}

impl MetadataManager {
    /// Merge `incoming` into the document of `dir`.
    ///
    /// Holds the write lock of `dir` across the read, merge and write, so
    /// concurrent mergers never interleave. An unreadable existing document
    /// is treated as absent and `incoming` becomes the whole document.
    pub async fn merge(
        &self,
        dir: &VirtualPath,
        incoming: Metadata,
    ) -> Result<Metadata, MetadataError> {
        let layout = self.layout(dir)?;
        let lock = self.locks().lock_path(dir);
        let _guard = lock.write().await;

        let existing = self.read(dir).await.into_option();
        if existing.is_none() {
            debug!(dir = %dir, "No existing metadata, incoming document taken whole");
        }
        let merged = merge_documents(existing, incoming, layout.as_ref(), timestamp_now());
        self.write_unlocked(dir, &merged).await?;
        Ok(merged)
    }

    /// Replace the document of `dir` with the union of `docs`.
    ///
    /// Returns `None` without writing when `docs` is empty.
    pub async fn merge_all(
        &self,
        dir: &VirtualPath,
        docs: Vec<Metadata>,
    ) -> Result<Option<Metadata>, MetadataError> {
        let layout = self.layout(dir)?;
        let now = timestamp_now();
        let merged = docs.into_iter().fold(None, |acc, doc| {
            Some(merge_documents(acc, doc, layout.as_ref(), now.clone()))
        });
        let Some(merged) = merged else {
            return Ok(None);
        };
        self.replace(dir, &merged).await?;
        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup;
    use super::*;
    use crate::layout::Maven2Layout;
    use depot_schema::{RepositoryPolicy, Snapshot, Versioning};
    use std::sync::Arc;

    fn doc(versions: &[&str]) -> Metadata {
        Metadata {
            group_id: Some("org.example".into()),
            artifact_id: Some("lib".into()),
            version: None,
            versioning: Versioning {
                versions: versions.iter().map(|v| (*v).to_string()).collect(),
                ..Versioning::default()
            },
        }
    }

    fn build(value: &str, classifier: Option<&str>) -> SnapshotVersion {
        SnapshotVersion {
            classifier: classifier.map(String::from),
            extension: "jar".into(),
            value: value.into(),
            updated: None,
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let base = doc(&["1.0", "1.1"]);
        let incoming = doc(&["1.1", "1.2"]);
        let once = merge_documents(Some(base), incoming.clone(), &Maven2Layout, "1".into());
        let twice = merge_documents(Some(once.clone()), incoming, &Maven2Layout, "2".into());
        assert_eq!(once.versioning.versions, twice.versioning.versions);
        assert_eq!(twice.versioning.versions, vec!["1.0", "1.1", "1.2"]);
        assert_eq!(twice.versioning.latest.as_deref(), Some("1.2"));
        assert_eq!(twice.versioning.last_updated.as_deref(), Some("2"));
    }

    #[test]
    fn merge_uses_layout_order() {
        let merged = merge_documents(
            Some(doc(&["1.9", "1.0-SNAPSHOT"])),
            doc(&["1.10", "1.0"]),
            &Maven2Layout,
            String::new(),
        );
        assert_eq!(merged.versioning.versions, vec!["1.0-SNAPSHOT", "1.0", "1.9", "1.10"]);
        assert_eq!(merged.versioning.release.as_deref(), Some("1.10"));
    }

    #[test]
    fn snapshot_builds_sorted_and_deduplicated() {
        let mut ours = doc(&[]);
        ours.versioning.snapshot_versions = vec![
            build("1.0-20240102.000000-2", None),
            build("1.0-20240101.000000-1", None),
        ];
        ours.versioning.snapshot = Some(Snapshot {
            timestamp: "20240102.000000".into(),
            build_number: 2,
        });
        let mut theirs = doc(&[]);
        theirs.versioning.snapshot_versions = vec![
            build("1.0-20240110.000000-10", None),
            build("1.0-20240101.000000-1", None),
            build("1.0-20240110.000000-10", Some("sources")),
        ];
        theirs.versioning.snapshot = Some(Snapshot {
            timestamp: "20240110.000000".into(),
            build_number: 10,
        });

        let merged = merge_documents(Some(ours), theirs, &Maven2Layout, String::new());
        let values: Vec<_> = merged
            .versioning
            .snapshot_versions
            .iter()
            .map(|b| b.value.as_str())
            .collect();
        assert_eq!(
            values,
            vec![
                "1.0-20240101.000000-1",
                "1.0-20240102.000000-2",
                "1.0-20240110.000000-10",
                "1.0-20240110.000000-10",
            ]
        );
        assert_eq!(merged.versioning.snapshot.unwrap().build_number, 10);
    }

    #[tokio::test]
    async fn merge_over_malformed_document_takes_incoming() {
        let (_dir, fs, manager) = setup(RepositoryPolicy::Release);
        super::super::tests::touch(&fs, "org/example/lib/maven-metadata.json");
        let base = fs.resolve("org/example/lib").unwrap();

        let merged = manager.merge(&base, doc(&["2.0", "1.0"])).await.unwrap();
        assert_eq!(merged.versioning.versions, vec!["1.0", "2.0"]);
        assert_eq!(manager.load(&base).await.unwrap(), Some(merged));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_merges_keep_every_version() {
        let (_dir, fs, manager) = setup(RepositoryPolicy::Release);
        let manager = Arc::new(manager);
        let base = fs.resolve("org/example/concurrent").unwrap();

        let mut tasks = Vec::new();
        for i in 0..12 {
            let manager = Arc::clone(&manager);
            let base = base.clone();
            tasks.push(tokio::spawn(async move {
                manager.merge(&base, doc(&[&format!("1.{i}")])).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let merged = manager.load(&base).await.unwrap().unwrap();
        let expected: Vec<String> = (0..12).map(|i| format!("1.{i}")).collect();
        assert_eq!(merged.versioning.versions, expected);
    }

    #[tokio::test]
    async fn merge_all_unions_members() {
        let (_dir, fs, manager) = setup(RepositoryPolicy::Release);
        let base = fs.resolve("org/example/lib").unwrap();
        let merged = manager
            .merge_all(&base, vec![doc(&["1.0", "1.1"]), doc(&["1.1", "1.2"])])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.versioning.versions, vec!["1.0", "1.1", "1.2"]);
        assert!(manager.merge_all(&base, Vec::new()).await.unwrap().is_none());
    }
}
