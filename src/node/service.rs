//! Storage Node Service
//!
//! The RPC-facing logic of one storage node. It knows nothing about
//! replication: it persists what it is sent, reports what it holds, and
//! forwards membership messages into the member table.

use super::store::{LocalStore, StoreError};
use crate::membership::table::MembershipTable;
use crate::membership::types::NodeId;
use crate::storage::client::{RpcError, StorageNodeClient};
use crate::storage::protocol::*;

use async_trait::async_trait;
use std::sync::Arc;

pub struct StorageNodeService {
    local: LocalStore,
    membership: Arc<MembershipTable>,
}

impl StorageNodeService {
    pub fn new(store: LocalStore, membership: Arc<MembershipTable>) -> Arc<Self> {
        Arc::new(Self {
            local: store,
            membership,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        self.membership.local_id()
    }

    pub fn membership(&self) -> &Arc<MembershipTable> {
        &self.membership
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.local
    }

    pub async fn store(&self, req: &StoreRequest) -> Result<StoreResponse, StoreError> {
        self.local
            .write(&req.bucket, &req.key, &req.data, req.timestamp)
            .await?;
        tracing::debug!(
            "Stored {}/{} ({} bytes, ts={})",
            req.bucket,
            req.key,
            req.data.len(),
            req.timestamp
        );
        Ok(StoreResponse { success: true })
    }

    pub async fn retrieve(&self, req: &RetrieveRequest) -> Result<RetrieveResponse, StoreError> {
        match self.local.read(&req.bucket, &req.key).await {
            Ok(object) => Ok(RetrieveResponse {
                found: true,
                data: object.data,
                timestamp: object.timestamp,
            }),
            Err(StoreError::NotFound { .. }) => Ok(RetrieveResponse::not_found()),
            Err(e) => Err(e),
        }
    }

    /// Deleting an object the node does not hold is acknowledged: either way
    /// the object is absent afterwards.
    pub async fn delete(&self, req: &DeleteRequest) -> Result<DeleteResponse, StoreError> {
        match self.local.delete(&req.bucket, &req.key).await {
            Ok(()) => {
                tracing::debug!("Deleted {}/{}", req.bucket, req.key);
                Ok(DeleteResponse { success: true })
            }
            Err(StoreError::NotFound { .. }) => Ok(DeleteResponse { success: true }),
            Err(e) => Err(e),
        }
    }

    pub fn gossip(&self, msg: GossipMessage) -> GossipResponse {
        let mut changed = usize::from(self.membership.merge(msg.from.clone()));
        changed += self.membership.merge_all(msg.members);
        if changed > 0 {
            tracing::info!("Gossip from {} updated {} member(s)", msg.from.id, changed);
        }

        GossipResponse {
            ack: true,
            members: self.membership.members(),
        }
    }

    pub fn cluster_status(&self) -> ClusterStatusResponse {
        ClusterStatusResponse {
            node_id: self.node_id().clone(),
            members: self.membership.members(),
        }
    }
}

/// In-process client: lets a coordinator drive a node without a network hop.
#[async_trait]
impl StorageNodeClient for StorageNodeService {
    async fn store(&self, request: &StoreRequest) -> Result<StoreResponse, RpcError> {
        StorageNodeService::store(self, request)
            .await
            .map_err(|e| RpcError::Rejected(e.to_string()))
    }

    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse, RpcError> {
        StorageNodeService::retrieve(self, request)
            .await
            .map_err(|e| RpcError::Rejected(e.to_string()))
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, RpcError> {
        StorageNodeService::delete(self, request)
            .await
            .map_err(|e| RpcError::Rejected(e.to_string()))
    }

    async fn gossip(&self, message: &GossipMessage) -> Result<GossipResponse, RpcError> {
        Ok(StorageNodeService::gossip(self, message.clone()))
    }

    async fn cluster_status(&self) -> Result<ClusterStatusResponse, RpcError> {
        Ok(StorageNodeService::cluster_status(self))
    }
}
