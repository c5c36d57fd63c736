//! Upstream endpoints of proxy repositories.

use crate::storage::ByteStream;
use async_trait::async_trait;
use depot_schema::{Repository, RepositoryKey};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Errors talking to a remote repository.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection, TLS or protocol failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status other than 404.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// The remote did not answer within the configured deadline.
    #[error("{url} timed out after {after:?}")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The repository has no remote endpoint configured.
    #[error("Repository {0} has no remote configured")]
    NotConfigured(RepositoryKey),
}

/// Fetches artifacts from a proxy's upstream.
#[async_trait]
pub trait RemoteArtifactResolver: Send + Sync + std::fmt::Debug {
    /// Stream `relative` from the remote; `None` on 404.
    async fn get(&self, relative: &str) -> Result<Option<ByteStream>, TransportError>;

    /// Returns true if the remote has `relative`.
    async fn head(&self, relative: &str) -> Result<bool, TransportError>;
}

/// [`RemoteArtifactResolver`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpRemoteResolver {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRemoteResolver {
    /// Resolver for `base_url`. Each exchange, response body included,
    /// must complete within `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Resolver for a proxy repository's configured remote.
    pub fn for_repository(repository: &Repository) -> Result<Self, TransportError> {
        let remote = repository
            .remote
            .as_ref()
            .ok_or_else(|| TransportError::NotConfigured(repository.key()))?;
        Self::new(&remote.url, Duration::from_secs(remote.timeout_secs))
    }

    fn url(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url, relative.trim_start_matches('/'))
    }

    fn timed_out(&self, url: &str) -> TransportError {
        TransportError::Timeout {
            url: url.to_string(),
            after: self.timeout,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        deadline: Instant,
    ) -> Result<reqwest::Response, TransportError> {
        tokio::time::timeout_at(deadline, request.send())
            .await
            .map_err(|_| self.timed_out(url))?
            .map_err(TransportError::from)
    }
}

#[async_trait]
impl RemoteArtifactResolver for HttpRemoteResolver {
    async fn get(&self, relative: &str) -> Result<Option<ByteStream>, TransportError> {
        let url = self.url(relative);
        debug!(%url, "Fetching from remote");
        let deadline = Instant::now() + self.timeout;
        let response = self.send(self.client.get(&url), &url, deadline).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }
        // The body shares the request's deadline; a slow body fails the write.
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();
        Ok(Some(with_deadline(stream, deadline, self.timed_out(&url))))
    }

    async fn head(&self, relative: &str) -> Result<bool, TransportError> {
        let url = self.url(relative);
        let deadline = Instant::now() + self.timeout;
        let response = self.send(self.client.head(&url), &url, deadline).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(true)
    }
}

/// Fail the stream with `expired` once `deadline` passes.
///
/// The error is carried as the source of a [`std::io::ErrorKind::TimedOut`]
/// error; see [`timeout_cause`].
fn with_deadline(stream: ByteStream, deadline: Instant, expired: TransportError) -> ByteStream {
    futures::stream::unfold(Some((stream, expired)), move |state| async move {
        let (mut stream, expired) = state?;
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(item)) => Some((item, Some((stream, expired)))),
            Ok(None) => None,
            Err(_) => Some((
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, expired)),
                None,
            )),
        }
    })
    .boxed()
}

/// The [`TransportError::Timeout`] behind a body read that hit its deadline.
pub fn timeout_cause(error: &std::io::Error) -> Option<TransportError> {
    match error.get_ref()?.downcast_ref::<TransportError>()? {
        TransportError::Timeout { url, after } => Some(TransportError::Timeout {
            url: url.clone(),
            after: *after,
        }),
        _ => None,
    }
}

/// Remote resolvers, one per proxy repository, created on first use.
#[derive(Debug, Default)]
pub struct RemoteRegistry {
    resolvers: Mutex<HashMap<RepositoryKey, Arc<dyn RemoteArtifactResolver>>>,
}

impl RemoteRegistry {
    /// An empty registry; HTTP resolvers are created lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `resolver` for the repository `key` instead of HTTP.
    pub fn insert(&self, key: RepositoryKey, resolver: Arc<dyn RemoteArtifactResolver>) {
        self.resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolver);
    }

    /// Resolver for a proxy repository.
    pub fn resolver(
        &self,
        repository: &Repository,
    ) -> Result<Arc<dyn RemoteArtifactResolver>, TransportError> {
        let key = repository.key();
        let mut resolvers = self
            .resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(resolver) = resolvers.get(&key) {
            return Ok(Arc::clone(resolver));
        }
        let resolver: Arc<dyn RemoteArtifactResolver> =
            Arc::new(HttpRemoteResolver::for_repository(repository)?);
        resolvers.insert(key, Arc::clone(&resolver));
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::read_all;

    #[tokio::test]
    async fn get_maps_status_codes() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/org/lib/1.0/lib-1.0.jar")
            .with_status(200)
            .with_body("jar bytes")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/org/lib/2.0/lib-2.0.jar")
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/org/lib/3.0/lib-3.0.jar")
            .with_status(503)
            .create_async()
            .await;

        let remote = HttpRemoteResolver::new(&server.url(), Duration::from_secs(5)).unwrap();

        let stream = remote.get("org/lib/1.0/lib-1.0.jar").await.unwrap().unwrap();
        assert_eq!(read_all(stream).await.unwrap(), b"jar bytes");
        assert!(remote.get("org/lib/2.0/lib-2.0.jar").await.unwrap().is_none());
        assert!(matches!(
            remote.get("/org/lib/3.0/lib-3.0.jar").await,
            Err(TransportError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn head_reports_existence() {
        let mut server = mockito::Server::new_async().await;
        let _found = server
            .mock("HEAD", "/a.pom")
            .with_status(200)
            .create_async()
            .await;
        let _missing = server
            .mock("HEAD", "/b.pom")
            .with_status(404)
            .create_async()
            .await;

        let remote =
            HttpRemoteResolver::new(&format!("{}/", server.url()), Duration::from_secs(5)).unwrap();
        assert!(remote.head("a.pom").await.unwrap());
        assert!(!remote.head("b.pom").await.unwrap());
    }

    #[tokio::test]
    async fn slow_body_hits_the_exchange_deadline() {
        let mut server = mockito::Server::new_async().await;
        let _slow = server
            .mock("GET", "/slow.jar")
            .with_chunked_body(|w| {
                for _ in 0..20 {
                    w.write_all(b"x")?;
                    std::thread::sleep(Duration::from_millis(150));
                }
                Ok(())
            })
            .create_async()
            .await;

        let remote = HttpRemoteResolver::new(&server.url(), Duration::from_secs(1)).unwrap();
        let started = std::time::Instant::now();
        let stream = remote.get("slow.jar").await.unwrap().unwrap();
        let error = read_all(stream).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(2500));
        assert_eq!(error.kind(), std::io::ErrorKind::TimedOut);
        assert!(matches!(
            timeout_cause(&error),
            Some(TransportError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_remote_is_transport_error() {
        let remote = HttpRemoteResolver::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        assert!(remote.get("x.jar").await.is_err());
    }

    #[test]
    fn registry_requires_remote_for_http() {
        let registry = RemoteRegistry::new();
        let repo = Repository::new("s", "hosted", depot_schema::RepositoryType::Hosted);
        assert!(matches!(
            registry.resolver(&repo),
            Err(TransportError::NotConfigured(_))
        ));
    }
}
