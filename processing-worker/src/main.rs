//! # Processing Worker
//!
//! Owns the data plane: subscribes to the Main Worker at startup to
//! obtain the symmetric key, then serves the `Process` RPC
//! (Get/Put/Delete) by composing the in-memory cache with a lock
//! backend, a storage backend, and AES-256-GCM encryption.
//!
//! ## Startup sequence
//!
//! 1. Load configuration from the environment (`store_core::config`).
//! 2. Build the storage backend (POSIX or object-store, per
//!    `s3_endpoint` presence) and the matching lock backend.
//! 3. Start the handshake loop against the Main Worker in the
//!    background; requests fail `Unavailable` until it completes.
//! 4. Serve the `Entity` gRPC service until `SIGINT`/`SIGTERM`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use store_core::cache::{self, Cache, CacheConfig};
use store_core::config::{Config, StorageKind};
use store_core::lock::{InMemoryLockBackend, LockBackend, PosixLockBackend};
use store_core::schema::{JsonSchemaValidator, SchemaValidator};
use store_core::storage::{ObjectStoreBackend, PosixBackend, StorageBackend};
use store_proto::EntityServer;

use processing_worker::handshake::{self, HandshakeConfig};
use processing_worker::keycell::KeyCell;
use processing_worker::rpc::EntityService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let worker_id = std::env::var("worker_id").unwrap_or_else(|_| format!("worker-{}", Uuid::new_v4()));
    let main_worker_addr =
        std::env::var("main_worker_addr").unwrap_or_else(|_| "http://127.0.0.1:50051".to_string());

    let storage: Arc<dyn StorageBackend> = match config.storage_backend() {
        StorageKind::Posix => Arc::new(PosixBackend::new(config.shared_fs.clone()).await?),
        StorageKind::ObjectStore => {
            let s3_cfg = config.s3.as_ref().expect("s3 config present when backend is ObjectStore");
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_sdk_s3::config::Region::new(s3_cfg.region.clone()))
                .endpoint_url(&s3_cfg.endpoint)
                .load()
                .await;
            let client = aws_sdk_s3::Client::new(&aws_config);
            Arc::new(ObjectStoreBackend::new(client, s3_cfg.bucket.clone()))
        }
    };

    // The lock backend mirrors the storage backend choice: POSIX gets
    // cross-process advisory locks, the object store gets
    // process-local mutexes.
    let locks: Arc<dyn LockBackend> = match config.storage_backend() {
        StorageKind::Posix => Arc::new(PosixLockBackend::new(config.shared_fs.clone())),
        StorageKind::ObjectStore => Arc::new(InMemoryLockBackend::new()),
    };

    let validator: Option<Arc<dyn SchemaValidator>> =
        Some(Arc::new(JsonSchemaValidator::new(storage.clone())));

    let cache = Arc::new(Cache::new(CacheConfig {
        max_size: config.cache_size,
        default_ttl: config.cache_ttl,
        cleanup_interval: Duration::from_secs(60),
    }));
    let _cleanup_handle = cache::spawn_cleanup_task(cache.clone(), Duration::from_secs(60));

    let key_cell = Arc::new(KeyCell::new());
    let handshake_cancel = CancellationToken::new();
    let handshake_task = tokio::spawn(handshake::run(
        HandshakeConfig {
            main_worker_addr,
            worker_id: worker_id.clone(),
            tags: [("grpc_addr".to_string(), config.grpc_addr.clone())].into(),
        },
        key_cell.clone(),
        handshake_cancel.clone(),
    ));

    let service = EntityService {
        storage,
        locks: locks.clone(),
        cache,
        key_cell,
        validator,
        writer_id: worker_id.clone(),
        key_id: config.key_id.clone(),
    };

    let addr = config.grpc_addr.parse()?;
    tracing::info!(%addr, worker_id = %worker_id, "processing worker listening");

    let shutdown = async {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
    };

    tonic::transport::Server::builder()
        .add_service(EntityServer::new(service))
        .serve_with_shutdown(addr, shutdown)
        .await?;

    handshake_cancel.cancel();
    let _ = handshake_task.await;
    locks.release_all().await;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
