//! In-memory worker registry.
//!
//! Generalizes the teacher's `TokenBlacklist` concurrent-map-plus-TTL
//! pattern (`jwt.rs`) from revoked-token bookkeeping into live
//! Processing-Worker bookkeeping: one record per `worker_id`, mutated
//! atomically on Subscribe, pruned when the worker's TTL lapses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Available,
    Deallocating,
}

/// A Processing Worker's registration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub key_id: String,
    #[serde(skip)]
    pub session_token: String,
    pub status: WorkerStatus,
    #[serde(skip)]
    pub last_seen: Instant,
    pub tags: HashMap<String, String>,
}

/// `worker_id → record`. A `DashMap` gives per-entry locking without a
/// single coarse lock, matching the teacher's preference for
/// lock-free concurrent maps over a `Mutex<HashMap>` where contention
/// matters.
pub struct WorkerRegistry {
    workers: DashMap<String, WorkerRecord>,
    worker_ttl: Duration,
}

impl WorkerRegistry {
    pub fn new(worker_ttl: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            worker_ttl,
        }
    }

    /// Registers or refreshes a worker record with `status=Available`
    /// and a fresh `last_seen`.
    pub fn upsert(&self, worker_id: &str, key_id: &str, session_token: &str, tags: HashMap<String, String>) {
        self.workers.insert(
            worker_id.to_string(),
            WorkerRecord {
                worker_id: worker_id.to_string(),
                key_id: key_id.to_string(),
                session_token: session_token.to_string(),
                status: WorkerStatus::Available,
                last_seen: Instant::now(),
                tags,
            },
        );
    }

    /// Updates `last_seen` on every Process call the router dispatches
    /// through this worker, keeping the TTL window alive.
    pub fn touch(&self, worker_id: &str) {
        if let Some(mut record) = self.workers.get_mut(worker_id) {
            record.last_seen = Instant::now();
        }
    }

    pub fn deregister(&self, worker_id: &str) {
        if let Some(mut record) = self.workers.get_mut(worker_id) {
            record.status = WorkerStatus::Deallocating;
        }
    }

    fn is_available(&self, record: &WorkerRecord) -> bool {
        record.status == WorkerStatus::Available && record.last_seen.elapsed() < self.worker_ttl
    }

    /// `worker_id`s currently Available, for the router's round-robin
    /// fallback.
    pub fn available_ids(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|entry| self.is_available(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerRecord> {
        self.workers
            .get(worker_id)
            .filter(|entry| self.is_available(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Snapshot for the admin worker-listing surface.
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        self.workers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Drops entries whose TTL has lapsed, Available or Deallocating
    /// alike. Intended for a periodic background sweep, same shape as
    /// the teacher's `TokenBlacklist::cleanup_expired`.
    pub fn prune_expired(&self) -> usize {
        let before = self.workers.len();
        self.workers
            .retain(|_, record| record.last_seen.elapsed() < self.worker_ttl);
        before - self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_get_round_trips() {
        let registry = WorkerRegistry::new(Duration::from_secs(60));
        registry.upsert("w1", "key-1", "tok-1", HashMap::new());
        let record = registry.get("w1").unwrap();
        assert_eq!(record.status, WorkerStatus::Available);
        assert_eq!(record.key_id, "key-1");
    }

    #[test]
    fn expired_worker_is_not_available() {
        let registry = WorkerRegistry::new(Duration::from_millis(1));
        registry.upsert("w1", "key-1", "tok-1", HashMap::new());
        std::thread::sleep(Duration::from_millis(10));
        assert!(registry.get("w1").is_none());
        assert!(registry.available_ids().is_empty());
    }

    #[test]
    fn deregister_marks_deallocating() {
        let registry = WorkerRegistry::new(Duration::from_secs(60));
        registry.upsert("w1", "key-1", "tok-1", HashMap::new());
        registry.deregister("w1");
        assert!(registry.get("w1").is_none());
        assert_eq!(registry.snapshot()[0].status, WorkerStatus::Deallocating);
    }
}
