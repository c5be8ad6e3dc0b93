//! The guarded in-process cell holding the unwrapped master key after a
//! successful handshake. The key resides only in this Processing
//! Worker's process memory; it never appears in logs, request/response
//! payloads, or persisted files.

use tokio::sync::RwLock;

use store_core::crypto::SymmetricKey;
use store_core::error::{StoreError, StoreResult};

pub struct KeyMaterial {
    pub key: SymmetricKey,
    pub session_token: String,
    pub key_id: String,
}

#[derive(Default)]
pub struct KeyCell {
    inner: RwLock<Option<KeyMaterial>>,
}

impl KeyCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, material: KeyMaterial) {
        let mut guard = self.inner.write().await;
        *guard = Some(material);
    }

    /// Copy-on-read under a read lock; never held across suspensions.
    pub async fn key(&self) -> StoreResult<SymmetricKey> {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(material) => Ok(material.key.clone()),
            None => Err(StoreError::Unavailable),
        }
    }

    pub async fn key_id(&self) -> StoreResult<String> {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(material) => Ok(material.key_id.clone()),
            None => Err(StoreError::Unavailable),
        }
    }

    pub async fn is_subscribed(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
