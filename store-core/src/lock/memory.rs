//! In-process reader/writer mutex per entity.
//!
//! Intended only for the object-store backend, which within a single
//! process is sufficient; this mode makes no promise of cross-process
//! exclusion.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use super::{LockBackend, LockGuard, LockMode};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
pub struct InMemoryLockBackend {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl InMemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Arc<RwLock<()>> {
        // Opportunistically drop entries nobody else references before
        // inserting/looking one up, so the map doesn't grow unbounded.
        self.locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

enum Held {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

struct MemoryGuard {
    #[allow(dead_code)]
    held: Held,
}

#[async_trait]
impl LockGuard for MemoryGuard {
    async fn release(self: Box<Self>) {
        // Dropping `self` releases the underlying tokio guard.
    }
}

#[async_trait]
impl LockBackend for InMemoryLockBackend {
    async fn acquire(&self, id: &str, mode: LockMode) -> StoreResult<Box<dyn LockGuard>> {
        let lock = self.entry(id);
        let held = match mode {
            LockMode::Shared => Held::Read(lock.read_owned().await),
            LockMode::Exclusive => Held::Write(lock.write_owned().await),
        };
        Ok(Box::new(MemoryGuard { held }))
    }

    async fn try_acquire(&self, id: &str, mode: LockMode) -> StoreResult<Box<dyn LockGuard>> {
        let lock = self.entry(id);
        let held = match mode {
            LockMode::Shared => lock
                .try_read_owned()
                .map(Held::Read)
                .map_err(|_| StoreError::AlreadyLocked(id.to_string()))?,
            LockMode::Exclusive => lock
                .try_write_owned()
                .map(Held::Write)
                .map_err(|_| StoreError::AlreadyLocked(id.to_string()))?,
        };
        Ok(Box::new(MemoryGuard { held }))
    }

    async fn release_all(&self) {
        // Held guards outlive their map entry via the Arc clone; this
        // only drops entries this backend is not actively tracking a
        // guard for, which is the best a process-local map can do
        // without callers handing guards back explicitly.
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exclusive_excludes_shared() {
        let backend = InMemoryLockBackend::new();
        let _write = backend.acquire("e1", LockMode::Exclusive).await.unwrap();
        let result = backend.try_acquire("e1", LockMode::Shared).await;
        assert!(matches!(result, Err(StoreError::AlreadyLocked(_))));
    }

    #[tokio::test]
    async fn shared_allows_shared() {
        let backend = InMemoryLockBackend::new();
        let _r1 = backend.try_acquire("e1", LockMode::Shared).await.unwrap();
        let _r2 = backend.try_acquire("e1", LockMode::Shared).await.unwrap();
    }

    #[tokio::test]
    async fn lock_released_on_drop_allows_next_exclusive() {
        let backend = InMemoryLockBackend::new();
        {
            let _write = backend.acquire("e1", LockMode::Exclusive).await.unwrap();
        }
        let result = backend.try_acquire("e1", LockMode::Exclusive).await;
        assert!(result.is_ok());
    }
}
