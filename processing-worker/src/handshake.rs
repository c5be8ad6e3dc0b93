//! Subscribe handshake client.
//!
//! Generates an ephemeral RSA key pair, calls `Subscribe` on the Main
//! Worker, unwraps the returned wrapped key, and stores the plaintext
//! key in the guarded `KeyCell`. Retries with exponential backoff
//! (1s initial, cap 30s) until canceled — an explicit finite-state
//! loop, not an open-ended sleep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use store_core::crypto;
use store_proto::{RegistryClient, SubscribeRequest};

use crate::keycell::{KeyCell, KeyMaterial};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct HandshakeConfig {
    pub main_worker_addr: String,
    pub worker_id: String,
    pub tags: HashMap<String, String>,
}

/// Runs the handshake loop until it succeeds once or `cancel` fires.
/// On success the key cell is populated and the function returns.
pub async fn run(config: HandshakeConfig, key_cell: Arc<KeyCell>, cancel: CancellationToken) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if cancel.is_cancelled() {
            tracing::info!("handshake canceled before completion");
            return;
        }

        match attempt(&config).await {
            Ok(material) => {
                tracing::info!(worker_id = %config.worker_id, key_id = %material.key_id, "subscribed to main worker");
                key_cell.set(material).await;
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, backoff_secs = backoff.as_secs(), "subscribe attempt failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => {
                        tracing::info!("handshake canceled during backoff");
                        return;
                    }
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn attempt(config: &HandshakeConfig) -> Result<KeyMaterial, String> {
    // Ephemeral: generated fresh on every attempt, the private half
    // dropped as soon as unwrap() returns.
    let (private, public) = crypto::generate_rsa().map_err(|e| e.to_string())?;
    let pub_pem = crypto::marshal_pub_pem(&public).map_err(|e| e.to_string())?;

    let channel = Channel::from_shared(config.main_worker_addr.clone())
        .map_err(|e| e.to_string())?
        .connect()
        .await
        .map_err(|e| e.to_string())?;
    let mut client = RegistryClient::new(channel);

    let response = client
        .subscribe(SubscribeRequest {
            worker_id: config.worker_id.clone(),
            pub_pem,
            tags: config.tags.clone(),
        })
        .await
        .map_err(|e| e.to_string())?
        .into_inner();

    let key = crypto::unwrap(&private, &response.wrapped_key).map_err(|e| e.to_string())?;

    Ok(KeyMaterial {
        key,
        session_token: response.session_token,
        key_id: response.key_id,
    })
}
