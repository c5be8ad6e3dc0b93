//! Environment-variable configuration.
//!
//! Loaded the way the teacher loads `DATABASE_URL` in `main.rs` — a
//! `.env` file via `dotenvy` followed by `std::env::var` reads, no
//! CLI flag parsing.

use std::time::Duration;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Posix,
    ObjectStore,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub region: String,
}

/// Every configuration field shared by both binaries (each reads only
/// the subset it needs).
#[derive(Debug, Clone)]
pub struct Config {
    pub grpc_addr: String,
    pub rest_addr: String,
    pub shared_fs: String,
    pub master_key_hex: Option<String>,
    pub key_id: String,
    pub worker_ttl: Duration,
    pub client_ttl: Duration,
    pub cache_size: usize,
    pub cache_ttl: Duration,
    pub grpc_max_recv_msg_size: usize,
    pub rest_max_body_size: usize,
    pub s3: Option<S3Config>,
    pub admin_key: Option<String>,
    pub key_store: Option<String>,
    /// HMAC signing secret for client/worker session tokens. Not named
    /// in the wire contract — the Main Worker's own ambient config, the
    /// way the teacher carries a `JWT_SECRET` alongside `DATABASE_URL`.
    pub session_secret: String,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> StoreResult<T> {
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| StoreError::Internal(format!("invalid value for {name}"))),
        None => Ok(default),
    }
}

impl Config {
    /// Loads `.env` (if present) then reads every configuration
    /// variable. Fatal startup errors (invalid key length, etc.) are
    /// surfaced to the caller as `StoreError::Internal` so `main` can
    /// exit non-zero.
    pub fn from_env() -> StoreResult<Self> {
        let _ = dotenvy::dotenv();

        let s3 = env_var("s3_endpoint").map(|endpoint| S3Config {
            endpoint,
            bucket: env_or("s3_bucket", "store"),
            access_key: env_or("s3_access_key", ""),
            secret_key: env_or("s3_secret_key", ""),
            use_ssl: env_parse("s3_use_ssl", true).unwrap_or(true),
            region: env_or("s3_region", "us-east-1"),
        });

        let cfg = Config {
            grpc_addr: env_or("grpc_addr", "0.0.0.0:50051"),
            rest_addr: env_or("rest_addr", "0.0.0.0:8080"),
            shared_fs: env_or("shared_fs", "./data"),
            master_key_hex: env_var("master_key"),
            key_id: env_or("key_id", "default"),
            worker_ttl: Duration::from_secs(env_parse("worker_ttl", 60)?),
            client_ttl: Duration::from_secs(env_parse("client_ttl", 900)?),
            cache_size: env_parse("cache_size", 1024usize)?,
            cache_ttl: Duration::from_secs(env_parse("cache_ttl", 0)?),
            grpc_max_recv_msg_size: env_parse("grpc_max_recv_msg_size", 4 * 1024 * 1024)?,
            rest_max_body_size: env_parse("rest_max_body_size", 1024 * 1024)?,
            s3,
            admin_key: env_var("admin_key"),
            key_store: env_var("key_store"),
            session_secret: env_var("session_secret").unwrap_or_else(|| {
                let generated = hex::encode(crate::crypto::generate_symmetric().as_ref());
                tracing::warn!("no session_secret configured; generated a fresh one for this process lifetime only");
                generated
            }),
        };

        if let Some(hex_key) = &cfg.master_key_hex {
            let bytes = hex::decode(hex_key)
                .map_err(|e| StoreError::Internal(format!("master_key is not valid hex: {e}")))?;
            if bytes.len() != crate::crypto::KEY_LEN {
                return Err(StoreError::Internal(format!(
                    "master_key must decode to {} bytes, got {}",
                    crate::crypto::KEY_LEN,
                    bytes.len()
                )));
            }
        }

        Ok(cfg)
    }

    pub fn storage_backend(&self) -> StorageKind {
        if self.s3.is_some() {
            StorageKind::ObjectStore
        } else {
            StorageKind::Posix
        }
    }

    /// Decodes `master_key_hex` into a symmetric key, or generates and
    /// logs a fresh one once if absent.
    pub fn load_or_generate_master_key(&self) -> StoreResult<crate::crypto::SymmetricKey> {
        match &self.master_key_hex {
            Some(hex_key) => {
                let bytes = hex::decode(hex_key)
                    .map_err(|e| StoreError::Internal(format!("master_key is not valid hex: {e}")))?;
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(zeroize::Zeroizing::new(arr))
            }
            None => {
                let key = crate::crypto::generate_symmetric();
                tracing::warn!(
                    master_key = %hex::encode(key.as_ref()),
                    "no master_key configured; generated a fresh one for this process lifetime only"
                );
                Ok(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_posix_backend() {
        std::env::remove_var("s3_endpoint");
        let cfg = Config {
            grpc_addr: "x".into(),
            rest_addr: "x".into(),
            shared_fs: "x".into(),
            master_key_hex: None,
            key_id: "x".into(),
            worker_ttl: Duration::from_secs(1),
            client_ttl: Duration::from_secs(1),
            cache_size: 1,
            cache_ttl: Duration::ZERO,
            grpc_max_recv_msg_size: 1,
            rest_max_body_size: 1,
            s3: None,
            admin_key: None,
            key_store: None,
            session_secret: "test-secret-key-at-least-32-characters-long".into(),
        };
        assert_eq!(cfg.storage_backend(), StorageKind::Posix);
    }
}
