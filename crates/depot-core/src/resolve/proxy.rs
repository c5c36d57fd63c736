use super::{RepositoryResolver, ResolutionChain, ResolutionScope, ResolveError, ResolvedArtifact};
use crate::io::{store_bytes, store_stream, write_companions};
use crate::layout::{LayoutProvider, checksum_subject};
use crate::remote::{RemoteArtifactResolver, timeout_cause};
use crate::storage::{StorageError, read_all};
use crate::vfs::VirtualPath;
use async_trait::async_trait;
use depot_schema::{Metadata, Repository};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache-or-fetch against the repository's remote.
///
/// Non-metadata files are immutable once cached. Metadata is refreshed when
/// the configured expiration says so and merged into the cached document.
/// If the remote fails and a cached copy exists, the cached copy is served.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyResolver;

#[async_trait]
impl RepositoryResolver for ProxyResolver {
    async fn resolve(
        &self,
        chain: &ResolutionChain,
        repository: &Arc<Repository>,
        path: &str,
        scope: &ResolutionScope,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let fs = chain.file_system(repository)?;
        let layout = chain.layout(repository)?;
        let cached = fs.resolve(path)?;
        if cached.is_internal() || cached.is_root() {
            return Ok(None);
        }

        // Checksums of metadata describe the merged local document, so they
        // are always served from the companions written with it.
        if layout.is_metadata_checksum(cached.relative()) {
            if let Some(subject) = checksum_subject(cached.relative()) {
                self.resolve(chain, repository, subject, scope).await?;
            }
            return chain.local_file(&cached).await;
        }

        let is_metadata = layout.is_metadata(cached.relative());
        let local = chain.local_file(&cached).await?;
        let remote = chain.remotes().resolver(repository)?;

        if local.is_some() {
            if !is_metadata {
                debug!(path = %cached, "Proxy cache hit");
                return Ok(local);
            }
            let expiration = repository
                .remote
                .as_ref()
                .map(|r| r.metadata_expiration)
                .unwrap_or_default();
            let expired = chain
                .metadata()
                .is_expired(&cached, &expiration, remote.as_ref())
                .await?;
            if !expired {
                debug!(path = %cached, "Cached metadata is fresh");
                return Ok(local);
            }
            debug!(path = %cached, "Cached metadata expired");
        }

        match fetch(chain, layout.as_ref(), &cached, is_metadata, remote.as_ref()).await {
            Ok(true) => chain.local_file(&cached).await,
            Ok(false) => {
                if local.is_some() {
                    debug!(path = %cached, "Remote no longer has file, serving cached copy");
                }
                Ok(local)
            }
            Err(e) => match local {
                Some(stale) => {
                    warn!(path = %cached, error = %e, "Remote failed, serving stale cached copy");
                    Ok(Some(stale))
                }
                None => Err(e),
            },
        }
    }
}

/// A body read that ran past the remote's deadline is a transport failure.
fn body_error(error: StorageError) -> ResolveError {
    if let StorageError::Io { source, .. } = &error {
        if let Some(timeout) = timeout_cause(source) {
            return ResolveError::Transport(timeout);
        }
    }
    error.into()
}

/// Fetch `cached` from the remote into the cache. Returns false on 404.
///
/// No path lock is held while the remote is read; metadata is buffered and
/// merged under the document lock afterwards, and the checksum of what the
/// remote served is recorded for checksum expiration.
async fn fetch(
    chain: &ResolutionChain,
    layout: &dyn LayoutProvider,
    cached: &VirtualPath,
    is_metadata: bool,
    remote: &dyn RemoteArtifactResolver,
) -> Result<bool, ResolveError> {
    let Some(stream) = remote.get(cached.relative()).await? else {
        debug!(path = %cached, "Remote does not have file");
        return Ok(false);
    };

    if is_metadata {
        let bytes = read_all(stream)
            .await
            .map_err(|e| body_error(StorageError::io(cached.target(), e)))?;
        match serde_json::from_slice::<Metadata>(&bytes) {
            Ok(doc) => {
                let dir = cached
                    .parent()
                    .unwrap_or_else(|| cached.file_system().root());
                chain.metadata().merge(&dir, doc).await?;
            }
            Err(e) => {
                warn!(path = %cached, error = %e, "Remote metadata is malformed, caching as-is");
                let outcome = store_bytes(cached, bytes.clone(), chain.checksums()).await?;
                write_companions(cached, &outcome.digests).await?;
            }
        }
        chain.metadata().record_upstream(cached, &bytes).await?;
    } else {
        let algorithms = if layout.is_checksum(cached.relative()) {
            &[][..]
        } else {
            chain.checksums()
        };
        let outcome = store_stream(cached, stream, algorithms)
            .await
            .map_err(body_error)?;
        write_companions(cached, &outcome.digests).await?;
    }
    info!(path = %cached, "Cached from remote");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{chain_with, proxy, put};
    use super::*;
    use crate::io::DigestSet;
    use crate::remote::TransportError;
    use depot_schema::{ChecksumAlgorithm, MetadataExpiration, RemoteRepository};
    use std::time::Duration;

    const JAR: &str = "org/lib/1.0/lib-1.0.jar";
    const DOC: &str = "org/lib/maven-metadata.json";

    fn doc(versions: &[&str]) -> String {
        let versions: Vec<String> = versions.iter().map(|v| format!("\"{v}\"")).collect();
        format!(r#"{{"versioning":{{"versions":[{}]}}}}"#, versions.join(","))
    }

    fn proxy_with(url: &str, metadata_expiration: MetadataExpiration) -> Repository {
        let mut repository = proxy("central", url);
        repository.remote = Some(RemoteRepository {
            metadata_expiration,
            timeout_secs: 1,
            ..RemoteRepository::new(url)
        });
        repository
    }

    fn expiring_proxy(url: &str) -> Repository {
        proxy_with(url, MetadataExpiration::Interval { seconds: 0 })
    }

    fn trickle(w: &mut dyn std::io::Write) -> std::io::Result<()> {
        for _ in 0..20 {
            w.write_all(b" ")?;
            std::thread::sleep(Duration::from_millis(150));
        }
        Ok(())
    }

    #[tokio::test]
    async fn fetches_once_then_serves_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/org/lib/1.0/lib-1.0.jar")
            .with_body("remote jar")
            .expect(1)
            .create_async()
            .await;
        let chain = chain_with(&dir, vec![proxy("central", &server.url())]);

        for _ in 0..2 {
            let found = chain.resolve("storage0", "central", JAR).await.unwrap().unwrap();
            assert_eq!(found.read_to_vec().await.unwrap(), b"remote jar");
        }
        mock.assert_async().await;
        assert!(dir.path().join("central").join(JAR).exists());
        assert!(dir.path().join("central/org/lib/1.0/lib-1.0.jar.sha1").exists());
    }

    #[tokio::test]
    async fn missing_upstream_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/org/lib/1.0/lib-1.0.jar")
            .with_status(404)
            .create_async()
            .await;
        let chain = chain_with(&dir, vec![proxy("central", &server.url())]);
        assert!(chain.resolve("storage0", "central", JAR).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_serves_stale_cache() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "central", DOC, &doc(&["1.0"]));
        let chain = chain_with(&dir, vec![expiring_proxy("http://127.0.0.1:1")]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let found = chain.resolve("storage0", "central", DOC).await.unwrap().unwrap();
        assert_eq!(found.read_to_vec().await.unwrap(), doc(&["1.0"]).as_bytes());
    }

    #[tokio::test]
    async fn unreachable_remote_without_cache_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with(&dir, vec![proxy("central", "http://127.0.0.1:1")]);
        assert!(matches!(
            chain.resolve("storage0", "central", JAR).await,
            Err(ResolveError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn expired_metadata_is_merged_with_remote() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "central", DOC, &doc(&["1.0"]));
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/org/lib/maven-metadata.json")
            .with_body(doc(&["1.1"]))
            .create_async()
            .await;
        let chain = chain_with(&dir, vec![expiring_proxy(&server.url())]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let found = chain.resolve("storage0", "central", DOC).await.unwrap().unwrap();
        let merged: Metadata = serde_json::from_slice(&found.read_to_vec().await.unwrap()).unwrap();
        assert_eq!(merged.versioning.versions, vec!["1.0", "1.1"]);
        assert_eq!(merged.versioning.latest.as_deref(), Some("1.1"));

        let checksum = chain
            .resolve("storage0", "central", "org/lib/maven-metadata.json.sha1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(checksum.size(), 40);
    }

    #[tokio::test]
    async fn unchanged_upstream_checksum_keeps_cached_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let body = doc(&["1.0"]);
        let sha1 = DigestSet::digest(&[ChecksumAlgorithm::Sha1], body.as_bytes())
            [&ChecksumAlgorithm::Sha1]
            .as_str()
            .to_string();
        let mut server = mockito::Server::new_async().await;
        let document = server
            .mock("GET", "/org/lib/maven-metadata.json")
            .with_body(body)
            .expect(1)
            .create_async()
            .await;
        let _checksum = server
            .mock("GET", "/org/lib/maven-metadata.json.sha1")
            .with_body(sha1)
            .create_async()
            .await;
        let chain = chain_with(
            &dir,
            vec![proxy_with(&server.url(), MetadataExpiration::Checksum)],
        );

        for _ in 0..4 {
            let found = chain.resolve("storage0", "central", DOC).await.unwrap().unwrap();
            let cached: Metadata =
                serde_json::from_slice(&found.read_to_vec().await.unwrap()).unwrap();
            assert_eq!(cached.versioning.versions, vec!["1.0"]);
        }
        document.assert_async().await;
        assert!(dir.path().join("central/.upstream/org/lib/maven-metadata.json.sha1").exists());
        let listed = chain
            .list(&depot_schema::RepositoryKey::new("storage0", "central"), "")
            .await
            .unwrap();
        assert!(!listed.iter().any(|name| name.starts_with('.')));
    }

    #[tokio::test]
    async fn slow_remote_serves_stale_metadata() {
        let dir = tempfile::tempdir().unwrap();
        put(&dir, "central", DOC, &doc(&["1.0"]));
        let mut server = mockito::Server::new_async().await;
        let _slow = server
            .mock("GET", "/org/lib/maven-metadata.json")
            .with_chunked_body(trickle)
            .create_async()
            .await;
        let chain = chain_with(&dir, vec![expiring_proxy(&server.url())]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let found = chain.resolve("storage0", "central", DOC).await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_millis(2500));
        assert_eq!(found.read_to_vec().await.unwrap(), doc(&["1.0"]).as_bytes());
    }

    #[tokio::test]
    async fn slow_remote_without_cache_times_out_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _slow = server
            .mock("GET", "/org/lib/1.0/lib-1.0.jar")
            .with_chunked_body(trickle)
            .create_async()
            .await;
        let chain = chain_with(&dir, vec![expiring_proxy(&server.url())]);

        assert!(matches!(
            chain.resolve("storage0", "central", JAR).await,
            Err(ResolveError::Transport(TransportError::Timeout { .. }))
        ));
        assert!(!dir.path().join("central").join(JAR).exists());
        let temp = dir.path().join("central/.temp/org/lib/1.0");
        let leftovers = std::fs::read_dir(&temp).map(Iterator::count).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}
