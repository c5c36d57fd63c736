use super::{
    MemberFilter, RepositoryResolver, ResolutionChain, ResolutionScope, ResolveError,
    ResolvedArtifact,
};
use crate::layout::checksum_subject;
use async_trait::async_trait;
use depot_schema::{Repository, RepositoryKey};
use std::sync::Arc;
use tracing::{debug, warn};

/// Members of `group` that may answer `path`, in declaration order.
///
/// Skips groups already being resolved, members denied by this group or an
/// enclosing one, unknown members and members out of service.
pub(crate) fn eligible_members(
    chain: &ResolutionChain,
    group: &Repository,
    path: &str,
    scope: &ResolutionScope,
    filter: &MemberFilter,
) -> Vec<RepositoryKey> {
    let key = group.key();
    group
        .member_keys()
        .into_iter()
        .filter(|member| {
            if *member == key || scope.is_visited(member) {
                warn!(group = %key, member = %member, "Group cycle, member skipped");
                return false;
            }
            if scope.is_denied(member) || !filter.allows(member) {
                debug!(group = %key, member = %member, path, "Routing rule skips member");
                return false;
            }
            match chain.repositories().get(member) {
                None => {
                    warn!(group = %key, member = %member, "Unknown group member");
                    false
                }
                Some(repository) if !repository.is_in_service() => {
                    debug!(group = %key, member = %member, "Member out of service");
                    false
                }
                Some(_) => true,
            }
        })
        .collect()
}

/// Resolution over the members of a group.
///
/// Artifacts come from the first member that has them. Metadata documents
/// are merged from every member into the group's own storage and served
/// from there.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupResolver;

#[async_trait]
impl RepositoryResolver for GroupResolver {
    async fn resolve(
        &self,
        chain: &ResolutionChain,
        repository: &Arc<Repository>,
        path: &str,
        scope: &ResolutionScope,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let key = repository.key();
        let layout = chain.layout(repository)?;
        let filter = MemberFilter::for_path(repository, path);
        let members = eligible_members(chain, repository, path, scope, &filter);
        let inner = scope.enter(&key, &filter);

        if layout.is_metadata(path) {
            return aggregate_metadata(chain, repository, path, &members, &inner).await;
        }
        if layout.is_metadata_checksum(path) {
            if let Some(subject) = checksum_subject(path) {
                self.resolve(chain, repository, subject, scope).await?;
            }
            let fs = chain.file_system(repository)?;
            return chain.local_file(&fs.resolve(path)?).await;
        }

        let mut failure = None;
        for member in members {
            match chain.resolve_in(&member, path, &inner).await {
                Ok(Some(found)) => {
                    debug!(group = %key, member = %member, path, "Resolved in member");
                    return Ok(Some(found));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(group = %key, member = %member, path, error = %e, "Member failed");
                    failure = Some(e);
                }
            }
        }
        failure.map_or(Ok(None), Err)
    }
}

async fn aggregate_metadata(
    chain: &ResolutionChain,
    group: &Arc<Repository>,
    path: &str,
    members: &[RepositoryKey],
    scope: &ResolutionScope,
) -> Result<Option<ResolvedArtifact>, ResolveError> {
    let mut documents = Vec::new();
    for member in members {
        match chain.resolve_in(member, path, scope).await {
            Ok(Some(found)) => documents.extend(chain.read_document(&found).await),
            Ok(None) => {}
            Err(e) => {
                warn!(group = %group.key(), member = %member, path, error = %e, "Member metadata failed");
            }
        }
    }

    let fs = chain.file_system(group)?;
    let target = fs.resolve(path)?;
    let dir = target.parent().unwrap_or_else(|| fs.root());
    if chain.metadata().merge_all(&dir, documents).await?.is_none() {
        return Ok(None);
    }
    chain.local_file(&target).await
}

#[cfg(test)]
mod tests {
    use super::super::tests::{chain_with, deny, group, hosted, put};
    use depot_schema::{Metadata, RepositoryKey, RepositoryStatus};

    const JAR: &str = "com/blocked/x/1.0/x-1.0.jar";

    fn doc(versions: &[&str]) -> String {
        let versions: Vec<String> = versions.iter().map(|v| format!("\"{v}\"")).collect();
        format!(
            r#"{{"groupId":"org","artifactId":"lib","versioning":{{"versions":[{}]}}}}"#,
            versions.join(",")
        )
    }

    #[tokio::test]
    async fn metadata_is_union_of_members() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "m1", "org/lib/maven-metadata.json", &doc(&["1.0", "1.1"]));
        put(&dir, "m2", "org/lib/maven-metadata.json", &doc(&["1.1", "1.2"]));
        let chain = chain_with(
            &dir,
            vec![hosted("m1"), hosted("m2"), group("public", &["m1", "m2"])],
        );

        let found = chain
            .resolve("storage0", "public", "org/lib/maven-metadata.json")
            .await
            .unwrap()
            .unwrap();
        let merged: Metadata = serde_json::from_slice(&found.read_to_vec().await.unwrap()).unwrap();
        assert_eq!(merged.versioning.versions, vec!["1.0", "1.1", "1.2"]);
        assert_eq!(merged.versioning.release.as_deref(), Some("1.2"));
        assert!(dir.path().join("public/org/lib/maven-metadata.json.sha1").exists());

        let checksum = chain
            .resolve("storage0", "public", "org/lib/maven-metadata.json.sha1")
            .await
            .unwrap();
        assert!(checksum.is_some());
    }

    #[tokio::test]
    async fn metadata_absent_everywhere_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with(&dir, vec![hosted("m1"), group("public", &["m1"])]);
        let found = chain
            .resolve("storage0", "public", "org/none/maven-metadata.json")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn first_member_wins_unless_routed_away() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "m1", JAR, "from m1");
        put(&dir, "m2", JAR, "from m2");
        put(&dir, "m1", "com/open/y/1.0/y-1.0.jar", "open m1");

        let mut public = group("public", &["m1", "m2"]);
        public.routing_rules = vec![deny("com/blocked/**", &["m1"])];
        let chain = chain_with(&dir, vec![hosted("m1"), hosted("m2"), public]);

        let found = chain.resolve("storage0", "public", JAR).await.unwrap().unwrap();
        assert_eq!(found.read_to_vec().await.unwrap(), b"from m2");
        let open = chain
            .resolve("storage0", "public", "com/open/y/1.0/y-1.0.jar")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.read_to_vec().await.unwrap(), b"open m1");
    }

    #[tokio::test]
    async fn outer_denial_reaches_nested_groups() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "m1", JAR, "from m1");
        put(&dir, "m2", JAR, "from m2");

        let mut outer = group("outer", &["inner", "m2"]);
        outer.routing_rules = vec![deny("com/blocked/**", &["m1"])];
        let chain = chain_with(
            &dir,
            vec![hosted("m1"), hosted("m2"), group("inner", &["m1"]), outer],
        );

        let found = chain.resolve("storage0", "outer", JAR).await.unwrap().unwrap();
        assert_eq!(found.read_to_vec().await.unwrap(), b"from m2");
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "m1", JAR, "from m1");
        let chain = chain_with(
            &dir,
            vec![hosted("m1"), group("a", &["b"]), group("b", &["a", "m1"])],
        );

        let found = chain.resolve("storage0", "a", JAR).await.unwrap().unwrap();
        assert_eq!(found.read_to_vec().await.unwrap(), b"from m1");
        assert!(chain.resolve("storage0", "a", "missing.jar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_service_members_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "m1", JAR, "from m1");
        put(&dir, "m2", JAR, "from m2");
        let chain = chain_with(
            &dir,
            vec![hosted("m1"), hosted("m2"), group("public", &["m1", "m2"])],
        );
        chain
            .repositories()
            .set_status(&RepositoryKey::new("storage0", "m1"), RepositoryStatus::OutOfService);

        let found = chain.resolve("storage0", "public", JAR).await.unwrap().unwrap();
        assert_eq!(found.read_to_vec().await.unwrap(), b"from m2");
    }
}
