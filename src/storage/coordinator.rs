//! Replication Coordinator
//!
//! Sits above the placement ring and a pool of node clients and turns single
//! node RPCs into replicated object operations.
//!
//! ## Operations
//! - **Write**: one timestamp per write, Store fanned out to all N replicas,
//!   succeeds once every call has finished and at least `W = N/2 + 1` acked.
//! - **Read**: Retrieve fanned out to all N replicas, the highest timestamp
//!   wins (last-write-wins), stale or missing replicas are repaired in the
//!   background.
//! - **Delete**: best-effort, succeeds if any replica acknowledged.
//!
//! Every operation works on an immutable snapshot of the topology taken when
//! it starts; membership changes swap in a new snapshot and never disturb
//! calls already in flight.

use super::client::{ClientMap, RpcError, StorageNodeClient};
use super::clock::TimestampClock;
use super::error::StorageError;
use super::protocol::*;
use super::repair::ReadRepairer;
use super::ring::ConsistentHashRing;
use crate::membership::types::{NodeId, NodeState};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;

/// Reader over an object's authoritative bytes.
pub type ObjectReader = Cursor<Vec<u8>>;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Replicas per object (N). Clamped to at least 1.
    pub replica_count: usize,
    /// Ring positions per node, used when the coordinator builds its own ring.
    pub virtual_nodes: usize,
    /// Upper bound for every individual node call.
    pub rpc_timeout: Duration,
    /// Upper bound for a single background repair write.
    pub repair_timeout: Duration,
    /// Maximum number of repair writes running at once.
    pub repair_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            replica_count: 3,
            virtual_nodes: 100,
            rpc_timeout: Duration::from_secs(2),
            repair_timeout: Duration::from_secs(5),
            repair_concurrency: 64,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_replica_count(mut self, replica_count: usize) -> Self {
        self.replica_count = replica_count;
        self
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }
}

/// Health of one ring member as seen by [`Coordinator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct NodeProbe {
    pub id: NodeId,
    /// A client handle exists for the node.
    pub connected: bool,
    /// The node answered the status query within the RPC timeout.
    pub reachable: bool,
    /// Alive members in the node's own membership view.
    pub alive_members: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub replica_count: usize,
    pub write_quorum: usize,
    pub virtual_nodes: usize,
    pub nodes: Vec<NodeProbe>,
}

#[derive(Clone)]
struct Topology {
    ring: ConsistentHashRing,
    clients: ClientMap,
}

impl Topology {
    /// Selected nodes that have a client. Unknown nodes are skipped.
    fn targets<'a>(
        &'a self,
        nodes: &'a [NodeId],
    ) -> Vec<(&'a NodeId, &'a Arc<dyn StorageNodeClient>)> {
        nodes
            .iter()
            .filter_map(|id| match self.clients.get(id) {
                Some(client) => Some((id, client)),
                None => {
                    tracing::debug!("No client for {}, skipping", id);
                    None
                }
            })
            .collect()
    }
}

pub struct Coordinator {
    topology: RwLock<Arc<Topology>>,
    replica_count: usize,
    write_quorum: usize,
    rpc_timeout: Duration,
    clock: TimestampClock,
    repairer: ReadRepairer,
}

impl Coordinator {
    pub fn new(ring: ConsistentHashRing, clients: ClientMap, config: CoordinatorConfig) -> Self {
        let replica_count = config.replica_count.max(1);

        Self {
            topology: RwLock::new(Arc::new(Topology { ring, clients })),
            replica_count,
            write_quorum: replica_count / 2 + 1,
            rpc_timeout: config.rpc_timeout,
            clock: TimestampClock::new(),
            repairer: ReadRepairer::new(config.repair_concurrency, config.repair_timeout),
        }
    }

    /// Builds the ring from the client map's node ids.
    pub fn from_clients(clients: ClientMap, config: CoordinatorConfig) -> Self {
        let mut ring = ConsistentHashRing::new(config.virtual_nodes);
        for id in clients.keys() {
            ring.add_node(id.clone());
        }
        Self::new(ring, clients, config)
    }

    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    pub fn write_quorum(&self) -> usize {
        self.write_quorum
    }

    /// Stores the full contents of `reader` on the object's replicas.
    ///
    /// Returns the number of bytes written once at least `W` replicas
    /// acknowledged. On a quorum failure some replicas may hold the new
    /// version; retrying is safe because stores are unconditional overwrites.
    ///
    /// HTTP nodes cap a Store body at 256 MiB of JSON, which bounds objects
    /// at roughly 190 MiB once base64-encoded.
    pub async fn write<R>(&self, bucket: &str, key: &str, mut reader: R) -> Result<u64, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(StorageError::Payload)?;
        let size = data.len() as u64;

        let topology = self.snapshot().await;
        let nodes = topology
            .ring
            .get_nodes(&object_key(bucket, key), self.replica_count);
        if nodes.is_empty() {
            return Err(StorageError::NoNodesAvailable);
        }

        let request = StoreRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            data,
            timestamp: self.clock.next(),
        };

        let targets = topology.targets(&nodes);
        let attempted = targets.len();
        let request = &request;
        let outcomes = join_all(targets.into_iter().map(|(id, client)| async move {
            (id, self.call(client.store(request)).await)
        }))
        .await;

        let mut acknowledged = 0;
        let mut last_error: Option<String> = None;
        for (id, outcome) in outcomes {
            match outcome {
                Ok(resp) if resp.success => acknowledged += 1,
                Ok(_) => {
                    tracing::warn!("Store of {}/{} rejected by {}", bucket, key, id);
                    last_error = Some(format!("{}: store rejected", id));
                }
                Err(e) => {
                    tracing::warn!("Store of {}/{} on {} failed: {}", bucket, key, id, e);
                    last_error = Some(format!("{}: {}", id, e));
                }
            }
        }

        if acknowledged < self.write_quorum {
            return Err(StorageError::QuorumFailed {
                acknowledged,
                required: self.write_quorum,
                attempted,
                last_error: last_error.unwrap_or_else(|| "no reachable replicas".to_string()),
            });
        }

        tracing::debug!(
            "Wrote {}/{} ({} bytes, ts={}) to {}/{} replicas",
            bucket,
            key,
            size,
            request.timestamp,
            acknowledged,
            nodes.len()
        );
        Ok(size)
    }

    /// Returns the newest version any reachable replica holds.
    ///
    /// Replicas that reported an older version or none at all are repaired in
    /// the background after this returns.
    pub async fn read(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError> {
        let topology = self.snapshot().await;
        let nodes = topology
            .ring
            .get_nodes(&object_key(bucket, key), self.replica_count);
        if nodes.is_empty() {
            return Err(StorageError::NoNodesAvailable);
        }

        let request = RetrieveRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let request = &request;
        let outcomes = join_all(topology.targets(&nodes).into_iter().map(
            |(id, client)| async move { (id, client, self.call(client.retrieve(request)).await) },
        ))
        .await;

        let mut replies: Vec<(NodeId, Arc<dyn StorageNodeClient>, RetrieveResponse)> =
            Vec::with_capacity(outcomes.len());
        for (id, client, outcome) in outcomes {
            match outcome {
                Ok(resp) => replies.push((id.clone(), client.clone(), resp)),
                Err(e) => tracing::warn!("Retrieve of {}/{} on {} failed: {}", bucket, key, id, e),
            }
        }

        let mut newest: Option<usize> = None;
        for (index, (_, _, resp)) in replies.iter().enumerate() {
            let newer = match newest {
                Some(current) => resp.timestamp > replies[current].2.timestamp,
                None => true,
            };
            if resp.found && newer {
                newest = Some(index);
            }
        }

        let Some(newest) = newest else {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        };

        let timestamp = replies[newest].2.timestamp;
        let stale: Vec<(NodeId, Arc<dyn StorageNodeClient>)> = replies
            .iter()
            .filter(|(_, _, resp)| !resp.found || resp.timestamp < timestamp)
            .map(|(id, client, _)| (id.clone(), client.clone()))
            .collect();
        let data = std::mem::take(&mut replies[newest].2.data);

        if !stale.is_empty() {
            let repair = Arc::new(StoreRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                data: data.clone(),
                timestamp,
            });
            let scheduled = self.repairer.schedule(stale, repair);
            tracing::debug!(
                "Scheduled {} read repair(s) for {}/{} (ts={})",
                scheduled,
                bucket,
                key,
                timestamp
            );
        }

        Ok(Cursor::new(data))
    }

    /// Removes the object from every replica that can be reached.
    ///
    /// Succeeds when at least one replica acknowledged. Replicas that missed
    /// the delete keep the object and may hand it back to the others through
    /// read repair.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let topology = self.snapshot().await;
        let nodes = topology
            .ring
            .get_nodes(&object_key(bucket, key), self.replica_count);
        if nodes.is_empty() {
            return Ok(());
        }

        let request = DeleteRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let targets = topology.targets(&nodes);
        let attempted = targets.len();
        let request = &request;
        let outcomes = join_all(targets.into_iter().map(|(id, client)| async move {
            (id, self.call(client.delete(request)).await)
        }))
        .await;

        let mut acknowledged = 0;
        let mut last_error: Option<String> = None;
        for (id, outcome) in outcomes {
            match outcome {
                Ok(resp) if resp.success => acknowledged += 1,
                Ok(_) => {
                    tracing::warn!("Delete of {}/{} rejected by {}", bucket, key, id);
                    last_error = Some(format!("{}: delete rejected", id));
                }
                Err(e) => {
                    tracing::warn!("Delete of {}/{} on {} failed: {}", bucket, key, id, e);
                    last_error = Some(format!("{}: {}", id, e));
                }
            }
        }

        if acknowledged == 0 {
            return Err(StorageError::DeleteFailed {
                attempted,
                last_error: last_error.unwrap_or_else(|| "no reachable replicas".to_string()),
            });
        }
        if acknowledged < nodes.len() {
            tracing::debug!(
                "Partial delete of {}/{}: {}/{} replicas",
                bucket,
                key,
                acknowledged,
                nodes.len()
            );
        }
        Ok(())
    }

    /// Probes every ring member with a cluster-status query.
    pub async fn status(&self) -> CoordinatorStatus {
        let topology = self.snapshot().await;

        let nodes = join_all(topology.ring.nodes().into_iter().map(|id| {
            let client = topology.clients.get(&id).cloned();
            async move {
                let Some(client) = client else {
                    return NodeProbe {
                        id,
                        connected: false,
                        reachable: false,
                        alive_members: None,
                        error: Some("no client".to_string()),
                    };
                };

                match self.call(client.cluster_status()).await {
                    Ok(status) => NodeProbe {
                        id,
                        connected: true,
                        reachable: true,
                        alive_members: Some(
                            status
                                .members
                                .iter()
                                .filter(|member| member.state == NodeState::Alive)
                                .count(),
                        ),
                        error: None,
                    },
                    Err(e) => NodeProbe {
                        id,
                        connected: true,
                        reachable: false,
                        alive_members: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        }))
        .await;

        CoordinatorStatus {
            replica_count: self.replica_count,
            write_quorum: self.write_quorum,
            virtual_nodes: topology.ring.virtual_nodes(),
            nodes,
        }
    }

    /// Adds a node to the ring together with its client.
    pub async fn add_node(&self, id: NodeId, client: Arc<dyn StorageNodeClient>) {
        let mut current = self.topology.write().await;
        let mut next = Topology::clone(&current);
        next.ring.add_node(id.clone());
        next.clients.insert(id.clone(), client);
        *current = Arc::new(next);
        tracing::info!("Added storage node {}", id);
    }

    pub async fn remove_node(&self, id: &NodeId) {
        let mut current = self.topology.write().await;
        let mut next = Topology::clone(&current);
        next.ring.remove_node(id);
        next.clients.remove(id);
        *current = Arc::new(next);
        tracing::info!("Removed storage node {}", id);
    }

    /// Replaces the client map; ring membership follows the map's keys.
    pub async fn replace_clients(&self, clients: ClientMap) {
        let mut current = self.topology.write().await;
        let mut ring = current.ring.clone();
        for id in ring.nodes() {
            if !clients.contains_key(&id) {
                ring.remove_node(&id);
            }
        }
        for id in clients.keys() {
            ring.add_node(id.clone());
        }
        tracing::info!("Topology refreshed: {} storage nodes", ring.node_count());
        *current = Arc::new(Topology { ring, clients });
    }

    pub async fn node_ids(&self) -> Vec<NodeId> {
        self.snapshot().await.ring.nodes()
    }

    /// Repairs currently running in the background.
    pub fn pending_repairs(&self) -> usize {
        self.repairer.in_flight()
    }

    /// Cancels outstanding read repairs.
    pub fn shutdown(&self) {
        self.repairer.shutdown();
    }

    async fn snapshot(&self) -> Arc<Topology> {
        self.topology.read().await.clone()
    }

    async fn call<T>(
        &self,
        rpc: impl Future<Output = Result<T, RpcError>>,
    ) -> Result<T, RpcError> {
        tokio::time::timeout(self.rpc_timeout, rpc)
            .await
            .unwrap_or_else(|_| Err(RpcError::Timeout(self.rpc_timeout)))
    }
}

/// Ring key of an object.
pub fn object_key(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

/// Object-store facade consumed by upstream file/object services.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError>;

    async fn read(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl FileStore for Coordinator {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        Coordinator::write(self, bucket, key, reader).await
    }

    async fn read(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError> {
        let reader = Coordinator::read(self, bucket, key).await?;
        Ok(Box::new(reader))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        Coordinator::delete(self, bucket, key).await
    }
}
