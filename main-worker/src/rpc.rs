//! `Registry` RPC server — the Subscribe handshake's Main Worker half.

use std::sync::Arc;
use std::time::Duration;

use store_core::config::Config;
use store_core::crypto::{self, SymmetricKey};
use store_core::error::StoreError;
use store_proto::{Registry, SubscribeRequest, SubscribeResponse};
use tonic::{Request, Response, Status};

use crate::registry::WorkerRegistry;

pub struct RegistryService {
    pub registry: Arc<WorkerRegistry>,
    pub master_key: SymmetricKey,
    pub key_id: String,
    pub session_secret: String,
    pub worker_ttl: Duration,
}

#[tonic::async_trait]
impl Registry for RegistryService {
    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<SubscribeResponse>, Status> {
        let req = request.into_inner();

        if req.worker_id.is_empty() {
            return Err(StoreError::InvalidArgument("worker_id must not be empty".into()).into());
        }

        let public_key = crypto::parse_pub_pem(&req.pub_pem)
            .map_err(|_| StoreError::InvalidArgument("pub_pem is not a valid RSA public key".into()))?;

        let wrapped_key = crypto::wrap(&public_key, &self.master_key)
            .map_err(|e| StoreError::Internal(format!("failed to wrap master key: {e}")))?;

        let session_token = crate::session::issue(
            &req.worker_id,
            &[],
            self.worker_ttl,
            &self.session_secret,
        );

        self.registry
            .upsert(&req.worker_id, &self.key_id, &session_token, req.tags);

        tracing::info!(worker_id = %req.worker_id, key_id = %self.key_id, "worker subscribed");

        Ok(Response::new(SubscribeResponse {
            session_token,
            wrapped_key,
            key_id: self.key_id.clone(),
        }))
    }
}

impl RegistryService {
    pub fn new(registry: Arc<WorkerRegistry>, master_key: SymmetricKey, session_secret: String, config: &Config) -> Self {
        Self {
            registry,
            master_key,
            key_id: config.key_id.clone(),
            session_secret,
            worker_ttl: config.worker_ttl,
        }
    }
}
