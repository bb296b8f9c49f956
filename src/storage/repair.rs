//! Read Repair Pool
//!
//! Pushes the authoritative version of an object to replicas a read found
//! stale or missing. Repairs are detached from the read that triggered them:
//! they run on their own tasks, with their own timeout and cancellation
//! scope, and their failures are only logged.
//!
//! Concurrency is bounded by a semaphore. When every permit is taken, new
//! repair targets are dropped; the next read of the key schedules them again.

use super::client::StorageNodeClient;
use super::protocol::StoreRequest;
use crate::membership::types::NodeId;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct ReadRepairer {
    permits: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl ReadRepairer {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawns one repair per target. Returns how many were scheduled.
    pub fn schedule(
        &self,
        targets: Vec<(NodeId, Arc<dyn StorageNodeClient>)>,
        request: Arc<StoreRequest>,
    ) -> usize {
        if self.shutdown.is_cancelled() {
            return 0;
        }

        let mut scheduled = 0;
        for (node_id, client) in targets {
            let permit = match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(
                        "Repair pool saturated, skipping repair of {}/{} on {}",
                        request.bucket,
                        request.key,
                        node_id
                    );
                    continue;
                }
            };

            let request = request.clone();
            let shutdown = self.shutdown.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                let _permit = permit;
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Repair of {} cancelled", node_id);
                    }
                    result = tokio::time::timeout(timeout, client.store(&request)) => {
                        match result {
                            Ok(Ok(resp)) if resp.success => tracing::debug!(
                                "Repaired {}/{} on {} (ts={})",
                                request.bucket,
                                request.key,
                                node_id,
                                request.timestamp
                            ),
                            Ok(Ok(_)) => tracing::warn!("Repair rejected by {}", node_id),
                            Ok(Err(e)) => tracing::warn!("Repair on {} failed: {}", node_id, e),
                            Err(_) => tracing::warn!("Repair on {} timed out after {:?}", node_id, timeout),
                        }
                    }
                }
            });
            scheduled += 1;
        }
        scheduled
    }

    /// Number of repairs currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Cancels running repairs and refuses new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
