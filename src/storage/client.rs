//! Node RPC Client
//!
//! The contract the coordinator uses to talk to storage nodes, plus its HTTP
//! implementation. Tests substitute in-process implementations.

use super::protocol::*;
use crate::membership::types::{Member, NodeId};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);
const BACKOFF_BASE_MS: u64 = 150;
const BACKOFF_CAP_MS: u64 = 1200;
const BACKOFF_JITTER_MS: u64 = 50;

/// Failure of a single call against a single node.
///
/// Never surfaced to coordinator callers directly; it is aggregated into a
/// quorum, not-found or delete failure.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("node responded with status {0}")]
    Status(u16),
    #[error("rpc timed out after {0:?}")]
    Timeout(Duration),
    #[error("node rejected request: {0}")]
    Rejected(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// RPC surface of a storage node.
#[async_trait]
pub trait StorageNodeClient: Send + Sync {
    async fn store(&self, request: &StoreRequest) -> Result<StoreResponse, RpcError>;

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse, RpcError>;

    async fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, RpcError>;

    async fn gossip(&self, message: &GossipMessage) -> Result<GossipResponse, RpcError>;

    async fn cluster_status(&self) -> Result<ClusterStatusResponse, RpcError>;
}

/// Physical node id -> client handle.
pub type ClientMap = HashMap<NodeId, Arc<dyn StorageNodeClient>>;

/// `StorageNodeClient` speaking JSON over HTTP to a node's axum router.
pub struct HttpNodeClient {
    base_url: String,
    http_client: reqwest::Client,
    attempts: usize,
    attempt_timeout: Duration,
}

impl HttpNodeClient {
    /// `addr` is either `host:port` or a full `http://host:port` URL.
    pub fn new(addr: &str) -> Self {
        Self::with_client(addr, reqwest::Client::new())
    }

    pub fn with_client(addr: &str, http_client: reqwest::Client) -> Self {
        let trimmed = addr.trim_end_matches('/');
        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        Self {
            base_url,
            http_client,
            attempts: DEFAULT_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds a client map for the given members, sharing one connection pool.
    pub fn pool<'a>(members: impl IntoIterator<Item = &'a Member>) -> ClientMap {
        let http_client = reqwest::Client::new();
        members
            .into_iter()
            .map(|member| {
                let client: Arc<dyn StorageNodeClient> =
                    Arc::new(Self::with_client(&member.addr, http_client.clone()));
                (member.id.clone(), client)
            })
            .collect()
    }

    async fn post_with_retry<T: Serialize + Sync>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<reqwest::Response, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        let mut delay_ms = BACKOFF_BASE_MS;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.attempt_timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(RpcError::Transport(e.to_string()));
                    }
                    tracing::debug!("POST {} failed (attempt {}): {}", url, attempt + 1, e);
                    backoff(&mut delay_ms).await;
                }
            }
        }

        Err(RpcError::Transport("retry attempts exhausted".to_string()))
    }

    async fn get_with_retry(&self, path: &str) -> Result<reqwest::Response, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        let mut delay_ms = BACKOFF_BASE_MS;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(self.attempt_timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(RpcError::Transport(e.to_string()));
                    }
                    tracing::debug!("GET {} failed (attempt {}): {}", url, attempt + 1, e);
                    backoff(&mut delay_ms).await;
                }
            }
        }

        Err(RpcError::Transport("retry attempts exhausted".to_string()))
    }
}

async fn backoff(delay_ms: &mut u64) {
    let jitter = rand::random::<u64>() % BACKOFF_JITTER_MS;
    tokio::time::sleep(Duration::from_millis(*delay_ms + jitter)).await;
    *delay_ms = (*delay_ms * 2).min(BACKOFF_CAP_MS);
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, RpcError> {
    let status = response.status();
    if !status.is_success() {
        return Err(RpcError::Status(status.as_u16()));
    }
    response
        .json::<R>()
        .await
        .map_err(|e| RpcError::Decode(e.to_string()))
}

#[async_trait]
impl StorageNodeClient for HttpNodeClient {
    async fn store(&self, request: &StoreRequest) -> Result<StoreResponse, RpcError> {
        let response = self.post_with_retry(ENDPOINT_STORE, request).await?;
        decode(response).await
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse, RpcError> {
        let response = self.post_with_retry(ENDPOINT_RETRIEVE, request).await?;
        decode(response).await
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, RpcError> {
        let response = self.post_with_retry(ENDPOINT_DELETE, request).await?;
        decode(response).await
    }

    async fn gossip(&self, message: &GossipMessage) -> Result<GossipResponse, RpcError> {
        let response = self.post_with_retry(ENDPOINT_GOSSIP, message).await?;
        decode(response).await
    }

    async fn cluster_status(&self) -> Result<ClusterStatusResponse, RpcError> {
        let response = self.get_with_retry(ENDPOINT_CLUSTER_STATUS).await?;
        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(
            HttpNodeClient::new("127.0.0.1:9101").base_url(),
            "http://127.0.0.1:9101"
        );
        assert_eq!(
            HttpNodeClient::new("http://node-a:9101/").base_url(),
            "http://node-a:9101"
        );
    }

    #[test]
    fn test_pool_builds_one_client_per_member() {
        let members = vec![
            Member::alive(NodeId::from("node-1"), "127.0.0.1:9101"),
            Member::alive(NodeId::from("node-2"), "127.0.0.1:9102"),
        ];

        let pool = HttpNodeClient::pool(&members);

        assert_eq!(pool.len(), 2);
        assert!(pool.contains_key(&NodeId::from("node-1")));
        assert!(pool.contains_key(&NodeId::from("node-2")));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpNodeClient::new(&addr.to_string()).with_attempts(1);
        let result = client.cluster_status().await;

        assert!(matches!(result, Err(RpcError::Transport(_))));
    }
}
