use super::{MetadataError, MetadataManager};
use crate::io::checksum::read_companion;
use crate::io::{DigestSet, write_companions};
use crate::remote::RemoteArtifactResolver;
use crate::storage::read_all;
use crate::vfs::{BackendProvider, PathProvider, VirtualPath};
use depot_schema::{Checksum, ChecksumAlgorithm, MetadataExpiration};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Algorithm compared by the checksum expiration strategy.
const EXPIRATION_CHECKSUM: ChecksumAlgorithm = ChecksumAlgorithm::Sha1;

impl MetadataManager {
    /// Decide whether the cached metadata file `cached` must be refetched.
    ///
    /// A missing file is always expired. With [`MetadataExpiration::Interval`]
    /// the file expires once it is older than the interval. With
    /// [`MetadataExpiration::Checksum`] it expires when the remote's `.sha1`
    /// differs from the one recorded by [`Self::record_upstream`] at the last
    /// refresh. If the remote checksum cannot be fetched the cached copy is
    /// kept.
    pub async fn is_expired(
        &self,
        cached: &VirtualPath,
        expiration: &MetadataExpiration,
        remote: &dyn RemoteArtifactResolver,
    ) -> Result<bool, MetadataError> {
        let Some(attributes) = BackendProvider.attributes(cached).await? else {
            return Ok(true);
        };
        match expiration {
            MetadataExpiration::Interval { seconds } => {
                let Some(modified) = attributes.modified else {
                    return Ok(true);
                };
                let age = SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or(Duration::ZERO);
                Ok(age > Duration::from_secs(*seconds))
            }
            MetadataExpiration::Checksum => {
                let recorded = cached.file_system().upstream_path(cached);
                let Some(local) =
                    read_companion(&BackendProvider, &recorded, EXPIRATION_CHECKSUM).await?
                else {
                    return Ok(true);
                };
                match remote_checksum(remote, cached.relative()).await {
                    Some(upstream) => Ok(upstream != local),
                    None => Ok(false),
                }
            }
        }
    }

    /// Record the checksum of the upstream bytes `cached` was just refreshed
    /// from, for later [`MetadataExpiration::Checksum`] comparisons.
    pub async fn record_upstream(
        &self,
        cached: &VirtualPath,
        upstream: &[u8],
    ) -> Result<(), MetadataError> {
        let recorded = cached.file_system().upstream_path(cached);
        let digests = DigestSet::digest(&[EXPIRATION_CHECKSUM], upstream);
        write_companions(&recorded, &digests).await?;
        debug!(path = %cached, "Recorded upstream checksum");
        Ok(())
    }
}

async fn remote_checksum(remote: &dyn RemoteArtifactResolver, relative: &str) -> Option<Checksum> {
    let companion = EXPIRATION_CHECKSUM.companion_name(relative);
    let stream = match remote.get(&companion).await {
        Ok(Some(stream)) => stream,
        Ok(None) => return None,
        Err(e) => {
            debug!(path = %companion, error = %e, "Remote checksum unavailable, keeping cache");
            return None;
        }
    };
    let bytes = read_all(stream).await.ok()?;
    Checksum::parse_file(&String::from_utf8_lossy(&bytes), EXPIRATION_CHECKSUM).ok()
}

#[cfg(test)]
mod tests {
    use super::super::tests::{setup, touch};
    use super::*;
    use crate::remote::HttpRemoteResolver;
    use depot_schema::RepositoryPolicy;

    const DOC: &str = "org/lib/maven-metadata.json";

    #[tokio::test]
    async fn interval_expiration() {
        let (_dir, fs, manager) = setup(RepositoryPolicy::Release);
        let remote = HttpRemoteResolver::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let cached = fs.resolve(DOC).unwrap();

        let hour = MetadataExpiration::Interval { seconds: 3600 };
        assert!(manager.is_expired(&cached, &hour, &remote).await.unwrap());

        touch(&fs, DOC);
        assert!(!manager.is_expired(&cached, &hour, &remote).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let immediate = MetadataExpiration::Interval { seconds: 0 };
        assert!(manager.is_expired(&cached, &immediate, &remote).await.unwrap());
    }

    #[tokio::test]
    async fn checksum_expiration_compares_recorded_upstream_sha1() {
        let (_dir, fs, manager) = setup(RepositoryPolicy::Release);
        touch(&fs, DOC);
        let cached = fs.resolve(DOC).unwrap();
        let unreachable =
            HttpRemoteResolver::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert!(
            manager
                .is_expired(&cached, &MetadataExpiration::Checksum, &unreachable)
                .await
                .unwrap()
        );

        let upstream = b"upstream document";
        manager.record_upstream(&cached, upstream).await.unwrap();
        let digests = DigestSet::digest(&[ChecksumAlgorithm::Sha1], upstream);
        let local = digests[&ChecksumAlgorithm::Sha1].as_str().to_string();
        assert!(!cached.with_suffix(".sha1").target().exists());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/org/lib/maven-metadata.json.sha1")
            .with_body(format!("{local}  maven-metadata.json\n"))
            .create_async()
            .await;
        let remote = HttpRemoteResolver::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(
            !manager
                .is_expired(&cached, &MetadataExpiration::Checksum, &remote)
                .await
                .unwrap()
        );
        mock.remove_async().await;

        let _changed = server
            .mock("GET", "/org/lib/maven-metadata.json.sha1")
            .with_body("da39a3ee5e6b4b0d3255bfef95601890afd80709")
            .create_async()
            .await;
        assert!(
            manager
                .is_expired(&cached, &MetadataExpiration::Checksum, &remote)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn checksum_expiration_keeps_cache_when_remote_fails() {
        let (_dir, fs, manager) = setup(RepositoryPolicy::Release);
        touch(&fs, DOC);
        let cached = fs.resolve(DOC).unwrap();
        manager.record_upstream(&cached, DOC.as_bytes()).await.unwrap();

        let remote = HttpRemoteResolver::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert!(
            !manager
                .is_expired(&cached, &MetadataExpiration::Checksum, &remote)
                .await
                .unwrap()
        );
    }
}
