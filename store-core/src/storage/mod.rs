//! Storage backend abstraction: one contract, two implementations — a
//! POSIX directory with atomic rename-based writes and an
//! S3-compatible object store.

mod objectstore;
mod posix;

pub use objectstore::ObjectStoreBackend;
pub use posix::PosixBackend;

use async_trait::async_trait;

use crate::entity::validate_entity_id;
use crate::error::{StoreError, StoreResult};

/// The ciphertext + metadata pair persisted for one entity.
pub struct StoredObject {
    pub ciphertext: Vec<u8>,
    pub metadata: crate::entity::EntityMetadata,
}

/// The contract both backends implement.
///
/// `write` must be atomic: a concurrent reader observes either the
/// previous pair or the new pair, never a mix (I1).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn write(
        &self,
        id: &str,
        ciphertext: &[u8],
        metadata: &crate::entity::EntityMetadata,
    ) -> StoreResult<()>;

    async fn read(&self, id: &str) -> StoreResult<StoredObject>;

    async fn exists(&self, id: &str) -> StoreResult<bool>;

    /// Removes both objects; missing objects are not an error.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Returns the set of entity-ids present.
    async fn list(&self) -> StoreResult<Vec<String>>;

    async fn write_template(&self, schema_id: &str, bytes: &[u8]) -> StoreResult<()>;

    async fn read_template(&self, schema_id: &str) -> StoreResult<Vec<u8>>;

    /// A local filesystem directory where templates are accessible as
    /// files for validator consumption. `None` when the backend has no
    /// such mirror prepared yet.
    async fn templates_dir(&self) -> StoreResult<std::path::PathBuf>;
}

/// Shared entity-id validation at the storage boundary: reject empty
/// ids, ids containing `/`, `\`, or `..`.
pub(crate) fn validate_id(id: &str) -> StoreResult<()> {
    validate_entity_id(id)
}

pub(crate) fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("entity '{id}' not found"))
}

pub const BLOB_SUFFIX: &str = ".json.enc";
pub const META_SUFFIX: &str = ".meta.json";
pub const FILES_PREFIX: &str = "files";
pub const TEMPLATES_PREFIX: &str = "templates";
