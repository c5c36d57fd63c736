use super::{RepositoryResolver, ResolutionChain, ResolutionScope, ResolveError, ResolvedArtifact};
use async_trait::async_trait;
use depot_schema::Repository;
use std::sync::Arc;

/// Local lookup; never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostedResolver;

#[async_trait]
impl RepositoryResolver for HostedResolver {
    async fn resolve(
        &self,
        chain: &ResolutionChain,
        repository: &Arc<Repository>,
        path: &str,
        _scope: &ResolutionScope,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let fs = chain.file_system(repository)?;
        chain.local_file(&fs.resolve(path)?).await
    }
}
