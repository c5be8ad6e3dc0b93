//! S3-compatible object store backend.
//!
//! Addresses keys under `files/` and `templates/` prefixes in a single
//! bucket. Atomicity of a single key relies on the object store's
//! read-after-write consistency; a metadata-put failure triggers a
//! best-effort delete of the blob to avoid orphans, and callers
//! recover on next read (which returns `NotFound` by metadata absence
//! alone).

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::fs;
use tokio::sync::OnceCell;

use super::{
    not_found, validate_id, StorageBackend, StoredObject, BLOB_SUFFIX, FILES_PREFIX, META_SUFFIX,
    TEMPLATES_PREFIX,
};
use crate::entity::EntityMetadata;
use crate::error::{StoreError, StoreResult};

pub struct ObjectStoreBackend {
    client: Client,
    bucket: String,
    /// Lazily populated local mirror directory for `templates_dir()`.
    template_mirror: OnceCell<PathBuf>,
}

impl ObjectStoreBackend {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            template_mirror: OnceCell::new(),
        }
    }

    fn blob_key(id: &str) -> String {
        format!("{FILES_PREFIX}/{id}{BLOB_SUFFIX}")
    }

    fn meta_key(id: &str) -> String {
        format!("{FILES_PREFIX}/{id}{META_SUFFIX}")
    }

    fn template_key(schema_id: &str) -> String {
        format!("{TEMPLATES_PREFIX}/{schema_id}.json")
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::Internal(format!("s3 put_object({key}) failed: {e}")))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Internal(format!("s3 body read failed: {e}")))?
                    .into_bytes();
                Ok(Some(bytes.to_vec()))
            }
            Err(err) => {
                if is_not_found(&err) {
                    Ok(None)
                } else {
                    Err(StoreError::Internal(format!("s3 get_object({key}) failed: {err}")))
                }
            }
        }
    }

    async fn delete_object(&self, key: &str) {
        let _ = self.client.delete_object().bucket(&self.bucket).key(key).send().await;
    }

    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let output = req
                .send()
                .await
                .map_err(|e| StoreError::Internal(format!("s3 list_objects_v2 failed: {e}")))?;
            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
            if output.is_truncated().unwrap_or(false) {
                continuation = output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(keys)
    }
}

fn is_not_found<E: std::fmt::Debug>(err: &E) -> bool {
    // The generated SDK error types vary per operation; matching on the
    // debug representation keeps this backend-agnostic without pulling
    // in every `*NotFound` variant by name.
    format!("{err:?}").contains("NoSuchKey") || format!("{err:?}").contains("NotFound")
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn write(
        &self,
        id: &str,
        ciphertext: &[u8],
        metadata: &EntityMetadata,
    ) -> StoreResult<()> {
        validate_id(id)?;
        let meta_bytes = serde_json::to_vec(metadata)
            .map_err(|e| StoreError::Internal(format!("metadata serialize failed: {e}")))?;

        self.put_object(&Self::blob_key(id), ciphertext.to_vec()).await?;

        if let Err(err) = self.put_object(&Self::meta_key(id), meta_bytes).await {
            self.delete_object(&Self::blob_key(id)).await;
            return Err(err);
        }
        Ok(())
    }

    async fn read(&self, id: &str) -> StoreResult<StoredObject> {
        validate_id(id)?;
        let ciphertext = self
            .get_object(&Self::blob_key(id))
            .await?
            .ok_or_else(|| not_found(id))?;
        let meta_bytes = self
            .get_object(&Self::meta_key(id))
            .await?
            .ok_or_else(|| not_found(id))?;
        let metadata: EntityMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| StoreError::Internal(format!("metadata corrupt: {e}")))?;
        Ok(StoredObject { ciphertext, metadata })
    }

    async fn exists(&self, id: &str) -> StoreResult<bool> {
        validate_id(id)?;
        Ok(self.get_object(&Self::meta_key(id)).await?.is_some())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        validate_id(id)?;
        self.delete_object(&Self::blob_key(id)).await;
        self.delete_object(&Self::meta_key(id)).await;
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let keys = self.list_prefix(&format!("{FILES_PREFIX}/")).await?;
        let mut ids: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for key in keys {
            let name = key.strip_prefix(&format!("{FILES_PREFIX}/")).unwrap_or(&key);
            if let Some(id) = name.strip_suffix(BLOB_SUFFIX) {
                ids.insert(id.to_string());
            } else if let Some(id) = name.strip_suffix(META_SUFFIX) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids.into_iter().collect())
    }

    async fn write_template(&self, schema_id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.put_object(&Self::template_key(schema_id), bytes.to_vec()).await
    }

    async fn read_template(&self, schema_id: &str) -> StoreResult<Vec<u8>> {
        self.get_object(&Self::template_key(schema_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("schema '{schema_id}' not found")))
    }

    /// Synchronizes all templates into a temporary local mirror on
    /// first call, so validators that expect a filesystem path keep
    /// working unmodified against the object-store backend.
    async fn templates_dir(&self) -> StoreResult<PathBuf> {
        let dir = self
            .template_mirror
            .get_or_try_init(|| async {
                let dir = std::env::temp_dir().join(format!("store-templates-{}", uuid::Uuid::new_v4()));
                fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| StoreError::Internal(format!("mirror dir create failed: {e}")))?;

                let keys = self.list_prefix(&format!("{TEMPLATES_PREFIX}/")).await?;
                for key in keys {
                    let Some(bytes) = self.get_object(&key).await? else {
                        continue;
                    };
                    let file_name = key.rsplit('/').next().unwrap_or(&key);
                    fs::write(dir.join(file_name), bytes)
                        .await
                        .map_err(|e| StoreError::Internal(format!("mirror write failed: {e}")))?;
                }
                Ok::<_, StoreError>(dir)
            })
            .await?;
        Ok(dir.clone())
    }
}
