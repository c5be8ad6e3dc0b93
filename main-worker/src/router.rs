//! Request router: picks a destination Processing Worker and forwards
//! the `Process` call.
//!
//! Picks a Processing Worker for an `entity_id` — preferring the one
//! that most recently served it (cache affinity), falling back to
//! round-robin across Available workers — and forwards the `Process`
//! call over a pooled gRPC connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tonic::transport::Channel;

use store_core::error::{StoreError, StoreResult};
use store_proto::{EntityClient, ProcessRequest, ProcessResponse};

use crate::registry::WorkerRegistry;

/// Maintains at most one active connection per `worker_id`;
/// reconnection is lazy, kicked off on the next dispatch after a
/// call fails.
pub struct Router {
    registry: Arc<WorkerRegistry>,
    affinity: DashMap<String, String>,
    connections: DashMap<String, EntityClient<Channel>>,
    round_robin: AtomicUsize,
}

impl Router {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            affinity: DashMap::new(),
            connections: DashMap::new(),
            round_robin: AtomicUsize::new(0),
        }
    }

    fn pick_worker(&self, entity_id: &str) -> StoreResult<String> {
        if let Some(affine) = self.affinity.get(entity_id) {
            if self.registry.get(&affine).is_some() {
                return Ok(affine.clone());
            }
        }

        let available = self.registry.available_ids();
        if available.is_empty() {
            return Err(StoreError::NotFound("no Processing Worker is Available".to_string()));
        }
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed) % available.len();
        Ok(available[index].clone())
    }

    async fn connection_for(&self, worker_id: &str) -> StoreResult<EntityClient<Channel>> {
        if let Some(client) = self.connections.get(worker_id) {
            return Ok(client.clone());
        }

        let record = self
            .registry
            .get(worker_id)
            .ok_or_else(|| StoreError::NotFound(format!("worker '{worker_id}' is no longer Available")))?;
        let addr = record
            .tags
            .get("grpc_addr")
            .ok_or_else(|| StoreError::Internal(format!("worker '{worker_id}' did not advertise a grpc_addr tag")))?;

        let channel = Channel::from_shared(addr.clone())
            .map_err(|e| StoreError::Internal(format!("invalid grpc_addr for '{worker_id}': {e}")))?
            .connect()
            .await
            .map_err(|e| StoreError::Internal(format!("could not connect to worker '{worker_id}': {e}")))?;
        let client = EntityClient::new(channel);
        self.connections.insert(worker_id.to_string(), client.clone());
        Ok(client)
    }

    /// Routes and forwards a `Process` request, recording affinity and
    /// refreshing the worker's `last_seen` on success. The worker's own
    /// session token (issued at Subscribe) is stamped onto the request
    /// so the Processing Worker can tell this call came from its Main
    /// Worker, not some other caller on the same network.
    pub async fn dispatch(&self, entity_id: &str, mut request: ProcessRequest) -> StoreResult<ProcessResponse> {
        let worker_id = self.pick_worker(entity_id)?;
        let record = self
            .registry
            .get(&worker_id)
            .ok_or_else(|| StoreError::NotFound(format!("worker '{worker_id}' is no longer Available")))?;
        request.token = record.session_token.clone();

        let mut client = self.connection_for(&worker_id).await?;

        // Drop a dead pooled connection here so the next dispatch to
        // this worker re-dials instead of retrying the same channel.
        let response = client.process(request).await.map_err(|status| {
            self.connections.remove(&worker_id);
            StoreError::Internal(format!("worker '{worker_id}' call failed: {}", status.message()))
        })?;

        self.affinity.insert(entity_id.to_string(), worker_id.clone());
        self.registry.touch(&worker_id);
        Ok(response.into_inner())
    }
}
