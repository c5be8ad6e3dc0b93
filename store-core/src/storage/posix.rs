//! POSIX directory backend.
//!
//! Each write writes blob and metadata to sibling `*.tmp` files, syncs
//! both, renames blob first then metadata, and on metadata-rename
//! failure attempts a best-effort rollback (rename the prior blob back
//! into place). Tmp files are cleaned up on any error path, so a crash
//! mid-write always leaves the previous completed pair (or nothing)
//! observable — never a mix (I1).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{
    not_found, validate_id, StorageBackend, StoredObject, BLOB_SUFFIX, FILES_PREFIX, META_SUFFIX,
    TEMPLATES_PREFIX,
};
use crate::entity::EntityMetadata;
use crate::error::{StoreError, StoreResult};

pub struct PosixBackend {
    root: PathBuf,
}

impl PosixBackend {
    /// `root` is the configured shared-filesystem directory. `files/`
    /// and `templates/` are created under it on first use.
    pub async fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(FILES_PREFIX))
            .await
            .map_err(|e| StoreError::Internal(format!("failed to create files dir: {e}")))?;
        fs::create_dir_all(root.join(TEMPLATES_PREFIX))
            .await
            .map_err(|e| StoreError::Internal(format!("failed to create templates dir: {e}")))?;
        Ok(Self { root })
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(FILES_PREFIX).join(format!("{id}{BLOB_SUFFIX}"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(FILES_PREFIX).join(format!("{id}{META_SUFFIX}"))
    }

    fn template_path(&self, schema_id: &str) -> PathBuf {
        self.root.join(TEMPLATES_PREFIX).join(format!("{schema_id}.json"))
    }

    fn backup_path(blob_path: &Path) -> PathBuf {
        blob_path.with_extension(format!("bak-{}", Uuid::new_v4()))
    }

    async fn write_atomic(&self, final_path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let tmp_path = final_path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let write_result: StoreResult<()> = async {
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(|e| StoreError::Internal(format!("tmp file create failed: {e}")))?;
            file.write_all(bytes)
                .await
                .map_err(|e| StoreError::Internal(format!("tmp file write failed: {e}")))?;
            file.sync_all()
                .await
                .map_err(|e| StoreError::Internal(format!("fsync failed: {e}")))?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(e) = fs::rename(&tmp_path, final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Internal(format!("rename failed: {e}")));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for PosixBackend {
    async fn write(
        &self,
        id: &str,
        ciphertext: &[u8],
        metadata: &EntityMetadata,
    ) -> StoreResult<()> {
        validate_id(id)?;
        let blob_path = self.blob_path(id);
        let meta_path = self.meta_path(id);
        let meta_bytes = serde_json::to_vec(metadata)
            .map_err(|e| StoreError::Internal(format!("metadata serialize failed: {e}")))?;

        // Blob first, metadata second: a reader that sees only the old
        // metadata + new blob would fail to decrypt (wrong nonce/tag),
        // which is safer than the reverse ordering. If a blob already
        // exists, it is renamed aside rather than overwritten in place
        // so a metadata-write failure can restore it, keeping the pair
        // consistent.
        let backup_path = Self::backup_path(&blob_path);
        let had_backup = fs::rename(&blob_path, &backup_path).await.is_ok();

        if let Err(err) = self.write_atomic(&blob_path, ciphertext).await {
            if had_backup {
                let _ = fs::rename(&backup_path, &blob_path).await;
            }
            return Err(err);
        }

        if let Err(err) = self.write_atomic(&meta_path, &meta_bytes).await {
            let _ = fs::remove_file(&blob_path).await;
            if had_backup {
                let _ = fs::rename(&backup_path, &blob_path).await;
            }
            return Err(err);
        }

        if had_backup {
            let _ = fs::remove_file(&backup_path).await;
        }
        Ok(())
    }

    async fn read(&self, id: &str) -> StoreResult<StoredObject> {
        validate_id(id)?;
        let blob_path = self.blob_path(id);
        let meta_path = self.meta_path(id);

        let ciphertext = fs::read(&blob_path)
            .await
            .map_err(|_| not_found(id))?;
        let meta_bytes = fs::read(&meta_path)
            .await
            .map_err(|_| not_found(id))?;
        let metadata: EntityMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| StoreError::Internal(format!("metadata corrupt: {e}")))?;

        Ok(StoredObject { ciphertext, metadata })
    }

    async fn exists(&self, id: &str) -> StoreResult<bool> {
        validate_id(id)?;
        Ok(fs::metadata(self.blob_path(id)).await.is_ok()
            && fs::metadata(self.meta_path(id)).await.is_ok())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        validate_id(id)?;
        let _ = fs::remove_file(self.blob_path(id)).await;
        let _ = fs::remove_file(self.meta_path(id)).await;
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let dir = self.root.join(FILES_PREFIX);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Internal(format!("read_dir failed: {e}")))?;

        let mut ids = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Internal(format!("read_dir entry failed: {e}")))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(BLOB_SUFFIX) {
                ids.insert(id.to_string());
            } else if let Some(id) = name.strip_suffix(META_SUFFIX) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids.into_iter().collect())
    }

    async fn write_template(&self, schema_id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.write_atomic(&self.template_path(schema_id), bytes).await
    }

    async fn read_template(&self, schema_id: &str) -> StoreResult<Vec<u8>> {
        fs::read(self.template_path(schema_id))
            .await
            .map_err(|_| StoreError::NotFound(format!("schema '{schema_id}' not found")))
    }

    async fn templates_dir(&self) -> StoreResult<PathBuf> {
        Ok(self.root.join(TEMPLATES_PREFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_metadata(database: &str, key: &str, version: u64) -> EntityMetadata {
        EntityMetadata {
            key_id: "k1".into(),
            alg: "AES-GCM".into(),
            iv: "aaaa".into(),
            tag: "bbbb".into(),
            schema_id: String::new(),
            version,
            writer_id: "worker-1".into(),
            timestamp: Utc::now(),
            database: database.into(),
            entity_key: key.into(),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::new(dir.path()).await.unwrap();
        let meta = sample_metadata("chatdb", "s1", 1);

        backend.write("chatdb_s1", b"ciphertext", &meta).await.unwrap();
        let obj = backend.read("chatdb_s1").await.unwrap();

        assert_eq!(obj.ciphertext, b"ciphertext");
        assert_eq!(obj.metadata.version, 1);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::new(dir.path()).await.unwrap();
        let result = backend.read("chatdb_missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::new(dir.path()).await.unwrap();
        let meta = sample_metadata("chatdb", "s1", 1);
        backend.write("chatdb_s1", b"x", &meta).await.unwrap();

        backend.delete("chatdb_s1").await.unwrap();
        backend.delete("chatdb_s1").await.unwrap();
        assert!(!backend.exists("chatdb_s1").await.unwrap());
    }

    #[tokio::test]
    async fn list_deduplicates_blob_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::new(dir.path()).await.unwrap();
        backend
            .write("chatdb_s1", b"x", &sample_metadata("chatdb", "s1", 1))
            .await
            .unwrap();
        backend
            .write("chatdb_s2", b"y", &sample_metadata("chatdb", "s2", 1))
            .await
            .unwrap();

        let mut ids = backend.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["chatdb_s1".to_string(), "chatdb_s2".to_string()]);
    }

    #[tokio::test]
    async fn second_put_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::new(dir.path()).await.unwrap();
        backend
            .write("chatdb_s1", b"first", &sample_metadata("chatdb", "s1", 1))
            .await
            .unwrap();
        backend
            .write("chatdb_s1", b"second", &sample_metadata("chatdb", "s1", 2))
            .await
            .unwrap();

        let obj = backend.read("chatdb_s1").await.unwrap();
        assert_eq!(obj.ciphertext, b"second");
        assert_eq!(obj.metadata.version, 2);
    }

    #[tokio::test]
    async fn template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::new(dir.path()).await.unwrap();
        backend.write_template("s1", b"{\"type\":\"object\"}").await.unwrap();
        let bytes = backend.read_template("s1").await.unwrap();
        assert_eq!(bytes, b"{\"type\":\"object\"}");
    }
}
