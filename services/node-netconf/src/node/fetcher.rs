//! Node lookups against the cluster API

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use tracing::{debug, error};

use super::types::NodeRecord;
use crate::error::{NetconfError, Result};

/// Source of authoritative Node records
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Fetch the named Node
    async fn fetch(&self, name: &str) -> Result<NodeRecord>;
}

/// Fetches Nodes straight from the API server.
///
/// Uses a plain `Api<Node>` rather than a reflector store, so a freshly
/// started process never reads a stale bootstrap cache.
pub struct KubeNodeFetcher {
    client: Client,
}

impl KubeNodeFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a fetcher with in-cluster or kubeconfig credentials
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl NodeSource for KubeNodeFetcher {
    async fn fetch(&self, name: &str) -> Result<NodeRecord> {
        let api: Api<Node> = Api::all(self.client.clone());

        let node = match api.get_opt(name).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                error!(node = %name, "Cluster node not found");
                return Err(NetconfError::NotFound(name.to_string()));
            }
            Err(e) => {
                error!(node = %name, error = %e, "Failed to retrieve cluster node info");
                return Err(e.into());
            }
        };

        debug!(node = %name, "Cluster node info retrieved");
        Ok(NodeRecord::from(&node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires a reachable cluster
    async fn test_fetch_missing_node() {
        let fetcher = KubeNodeFetcher::try_default().await.unwrap();
        let result = fetcher.fetch("node-that-does-not-exist").await;
        assert!(matches!(result, Err(NetconfError::NotFound(_))));
    }
}
