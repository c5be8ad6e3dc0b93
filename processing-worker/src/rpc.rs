//! The `Process` RPC server: Get/Put/Delete composed from cache + lock
//! + storage + crypto.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use tonic::{Request, Response, Status};

use store_core::cache::Cache;
use store_core::crypto::{self, NONCE_LEN, TAG_LEN};
use store_core::entity::{entity_id as compute_entity_id, EntityMetadata};
use store_core::error::{StoreError, StoreResult};
use store_core::lock::{LockBackend, LockMode};
use store_core::schema::SchemaValidator;
use store_core::storage::StorageBackend;
use store_proto::{Entity, ProcessRequest, ProcessResponse};

use crate::keycell::KeyCell;

pub struct EntityService {
    pub storage: Arc<dyn StorageBackend>,
    pub locks: Arc<dyn LockBackend>,
    pub cache: Arc<Cache>,
    pub key_cell: Arc<KeyCell>,
    pub validator: Option<Arc<dyn SchemaValidator>>,
    pub writer_id: String,
    pub key_id: String,
}

impl EntityService {
    async fn handle_get(&self, id: &str) -> StoreResult<(Vec<u8>, u64)> {
        if let Some((bytes, version)) = self.cache.get(id).await {
            tracing::debug!(entity_id = id, "cache hit");
            return Ok((bytes, version));
        }

        let guard = self.locks.acquire(id, LockMode::Shared).await?;
        let result = async {
            let stored = self.storage.read(id).await?;
            let key = self.key_cell.key().await?;

            let nonce = decode_fixed::<NONCE_LEN>(&stored.metadata.iv, "iv")?;
            let tag = decode_fixed::<TAG_LEN>(&stored.metadata.tag, "tag")?;
            let plaintext = crypto::decrypt(&key, &stored.ciphertext, &nonce, &tag)?;

            self.cache.set(id, plaintext.clone(), stored.metadata.version).await;
            Ok((plaintext, stored.metadata.version))
        }
        .await;
        guard.release().await;
        result
    }

    async fn handle_put(
        &self,
        database: &str,
        entity_key: &str,
        id: &str,
        schema_id: &str,
        payload: &[u8],
    ) -> StoreResult<u64> {
        if payload.is_empty() {
            return Err(StoreError::InvalidArgument("payload must not be empty".into()));
        }
        if !schema_id.is_empty() {
            if let Some(validator) = &self.validator {
                validator.validate(schema_id, payload).await?;
            }
        }

        let guard = self.locks.acquire(id, LockMode::Exclusive).await?;
        let result = async {
            let next_version = match self.storage.read(id).await {
                Ok(existing) => existing.metadata.version + 1,
                Err(StoreError::NotFound(_)) => 1,
                Err(err) => return Err(err),
            };

            let key = self.key_cell.key().await?;
            let encrypted = crypto::encrypt(&key, payload)?;

            let metadata = EntityMetadata {
                key_id: self.key_id.clone(),
                alg: "AES-GCM".to_string(),
                iv: BASE64.encode(encrypted.nonce),
                tag: BASE64.encode(encrypted.tag),
                schema_id: schema_id.to_string(),
                version: next_version,
                writer_id: self.writer_id.clone(),
                timestamp: Utc::now(),
                database: database.to_string(),
                entity_key: entity_key.to_string(),
            };

            self.storage.write(id, &encrypted.ciphertext, &metadata).await?;
            self.cache.set(id, payload.to_vec(), next_version).await;
            Ok(next_version)
        }
        .await;
        guard.release().await;
        result
    }

    async fn handle_delete(&self, id: &str) -> StoreResult<()> {
        let guard = self.locks.acquire(id, LockMode::Exclusive).await?;
        let result = self.storage.delete(id).await;
        if result.is_ok() {
            self.cache.evict(id).await;
        }
        guard.release().await;
        result
    }
}

fn decode_fixed<const N: usize>(value: &str, label: &str) -> StoreResult<[u8; N]> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| StoreError::Internal(format!("metadata {label} is not valid base64: {e}")))?;
    if bytes.len() != N {
        return Err(StoreError::Internal(format!(
            "metadata {label} has unexpected length {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[tonic::async_trait]
impl Entity for EntityService {
    async fn process(
        &self,
        request: Request<ProcessRequest>,
    ) -> Result<Response<ProcessResponse>, Status> {
        let req = request.into_inner();

        let id = match compute_entity_id(&req.database_name, &req.entity_key) {
            Ok(id) => id,
            Err(err) => return Ok(Response::new(error_response(err))),
        };

        tracing::info!(entity_id = %id, operation = %req.operation, "process request");

        let outcome: StoreResult<ProcessResponse> = async {
            match req.operation.as_str() {
                "GET" => {
                    let (bytes, version) = self.handle_get(&id).await?;
                    Ok(ProcessResponse {
                        status: "OK".to_string(),
                        result: bytes,
                        version: version.to_string(),
                        error: String::new(),
                    })
                }
                "PUT" => {
                    let version = self
                        .handle_put(&req.database_name, &req.entity_key, &id, &req.schema_id, &req.payload)
                        .await?;
                    Ok(ProcessResponse {
                        status: "OK".to_string(),
                        result: Vec::new(),
                        version: version.to_string(),
                        error: String::new(),
                    })
                }
                "DELETE" => {
                    self.handle_delete(&id).await?;
                    Ok(ProcessResponse {
                        status: "OK".to_string(),
                        result: Vec::new(),
                        version: String::new(),
                        error: String::new(),
                    })
                }
                other => Err(StoreError::InvalidArgument(format!("unknown operation '{other}'"))),
            }
        }
        .await;

        match outcome {
            Ok(response) => Ok(Response::new(response)),
            Err(err) => {
                tracing::warn!(entity_id = %id, error = %err, "process request failed");
                Ok(Response::new(error_response(err)))
            }
        }
    }
}

fn error_response(err: StoreError) -> ProcessResponse {
    ProcessResponse {
        status: err.code().to_string(),
        result: Vec::new(),
        version: String::new(),
        error: err.wire_message(),
    }
}
