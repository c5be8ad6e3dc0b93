//! POSIX advisory-lock backend.
//!
//! One lock file per entity at `files/<entity_id>.json.enc.lock`, held
//! with an OS advisory lock (`flock`) so the lock is visible across
//! every process sharing the directory. Process death releases the OS
//! lock automatically; within one process, a small map of currently
//! held ids short-circuits a second acquire on the same entity so two
//! callers in this process never block on (or silently double-count)
//! the same advisory lock.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use fs4::FileExt;

use super::{LockBackend, LockGuard, LockMode};
use crate::error::{StoreError, StoreResult};
use crate::storage::{BLOB_SUFFIX, FILES_PREFIX};

pub struct PosixLockBackend {
    root: PathBuf,
    held: Arc<DashSet<String>>,
}

impl PosixLockBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            held: Arc::new(DashSet::new()),
        }
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.root.join(FILES_PREFIX).join(format!("{id}{BLOB_SUFFIX}.lock"))
    }

    fn open_lock_file(path: &Path) -> StoreResult<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Internal(format!("lock dir create failed: {e}")))?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::Internal(format!("lock file open failed: {e}")))
    }
}

struct PosixLockGuard {
    id: String,
    held: Arc<DashSet<String>>,
    file: Option<File>,
}

#[async_trait]
impl LockGuard for PosixLockGuard {
    async fn release(mut self: Box<Self>) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        self.held.remove(&self.id);
    }
}

impl Drop for PosixLockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        self.held.remove(&self.id);
    }
}

#[async_trait]
impl LockBackend for PosixLockBackend {
    async fn acquire(&self, id: &str, mode: LockMode) -> StoreResult<Box<dyn LockGuard>> {
        if !self.held.insert(id.to_string()) {
            return Err(StoreError::AlreadyLocked(id.to_string()));
        }

        let path = self.lock_path(id);
        let held = self.held.clone();
        let id_owned = id.to_string();
        let result = tokio::task::spawn_blocking(move || -> StoreResult<File> {
            let file = PosixLockBackend::open_lock_file(&path)?;
            match mode {
                LockMode::Shared => FileExt::lock_shared(&file),
                LockMode::Exclusive => FileExt::lock_exclusive(&file),
            }
            .map_err(|e| StoreError::Internal(format!("flock failed: {e}")))?;
            Ok(file)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("lock task join failed: {e}")))?;

        match result {
            Ok(file) => Ok(Box::new(PosixLockGuard {
                id: id_owned,
                held,
                file: Some(file),
            })),
            Err(err) => {
                self.held.remove(&id_owned);
                Err(err)
            }
        }
    }

    async fn try_acquire(&self, id: &str, mode: LockMode) -> StoreResult<Box<dyn LockGuard>> {
        if !self.held.insert(id.to_string()) {
            return Err(StoreError::AlreadyLocked(id.to_string()));
        }

        let path = self.lock_path(id);
        let file = match Self::open_lock_file(&path) {
            Ok(f) => f,
            Err(err) => {
                self.held.remove(id);
                return Err(err);
            }
        };

        let lock_result = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };

        match lock_result {
            Ok(true) => Ok(Box::new(PosixLockGuard {
                id: id.to_string(),
                held: self.held.clone(),
                file: Some(file),
            })),
            Ok(false) | Err(_) => {
                self.held.remove(id);
                Err(StoreError::AlreadyLocked(id.to_string()))
            }
        }
    }

    async fn release_all(&self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn double_acquire_in_same_process_is_already_locked() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixLockBackend::new(dir.path());
        let _first = backend.acquire("chatdb_s1", LockMode::Exclusive).await.unwrap();
        let second = backend.try_acquire("chatdb_s1", LockMode::Shared).await;
        assert!(matches!(second, Err(StoreError::AlreadyLocked(_))));
    }

    #[tokio::test]
    async fn release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixLockBackend::new(dir.path());
        let guard = backend.acquire("chatdb_s1", LockMode::Exclusive).await.unwrap();
        guard.release().await;
        let again = backend.acquire("chatdb_s1", LockMode::Exclusive).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixLockBackend::new(dir.path());
        {
            let _guard = backend.acquire("chatdb_s1", LockMode::Exclusive).await.unwrap();
        }
        let again = backend.try_acquire("chatdb_s1", LockMode::Exclusive).await;
        assert!(again.is_ok());
    }
}
