//! Main Worker entry point: a stateless front door exposing the REST
//! surface and the `Registry.Subscribe` RPC.
//!
//! Startup sequence follows the teacher's `main.rs` shape — init
//! logging, load config/state, wire routes, serve — generalized to run
//! two servers (REST + gRPC) concurrently and drain both on shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, put};
use axum::Router as AxumRouter;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use store_core::config::{Config, StorageKind};
use store_core::storage::{ObjectStoreBackend, PosixBackend, StorageBackend};
use store_proto::RegistryServer;

use main_worker::auth::Authorizer;
use main_worker::handlers::{self, AppState};
use main_worker::registry::WorkerRegistry;
use main_worker::router::Router;
use main_worker::rpc::RegistryService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let templates: Arc<dyn StorageBackend> = match config.storage_backend() {
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

    let master_key = config.load_or_generate_master_key()?;
    let registry = Arc::new(WorkerRegistry::new(config.worker_ttl));
    let authorizer = Authorizer::new(config.admin_key.clone(), config.key_store.as_deref(), config.session_secret.clone())?;

    let state = Arc::new(AppState {
        registry: registry.clone(),
        router: Router::new(registry.clone()),
        authorizer,
        templates,
        client_ttl: config.client_ttl,
        rest_max_body_size: config.rest_max_body_size,
    });

    let registry_service = RegistryService::new(registry.clone(), master_key, config.session_secret.clone(), &config);

    let app = AxumRouter::new()
        .route("/health", get(handlers::health))
        .route("/api/login", axum::routing::post(handlers::login))
        .route(
            "/entity/:database",
            get(handlers::get_entity).put(handlers::put_entity).delete(handlers::delete_entity),
        )
        .route("/admin/workers", get(handlers::list_workers))
        .route("/admin/schemas", get(handlers::list_schemas))
        .route("/schema/:id", get(handlers::get_schema).put(handlers::put_schema))
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.rest_max_body_size))
        .with_state(state);

    let rest_addr = config.rest_addr.clone();
    let grpc_addr: std::net::SocketAddr = config.grpc_addr.parse()?;

    let prune_registry = registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let pruned = prune_registry.prune_expired();
            if pruned > 0 {
                tracing::debug!(pruned, "pruned expired worker records");
            }
        }
    });

    tracing::info!(%rest_addr, %grpc_addr, "main worker listening");

    let rest_shutdown = async {
        shutdown_signal().await;
        tracing::info!("rest shutdown signal received, draining");
    };
    let grpc_shutdown = async {
        shutdown_signal().await;
        tracing::info!("grpc shutdown signal received, draining");
    };

    let rest_listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    let rest_server = axum::serve(rest_listener, app).with_graceful_shutdown(rest_shutdown);

    let grpc_server = tonic::transport::Server::builder()
        .add_service(RegistryServer::new(registry_service))
        .serve_with_shutdown(grpc_addr, grpc_shutdown);

    tokio::try_join!(
        async { rest_server.await.map_err(|e| Box::new(e) as Box<dyn std::error::Error>) },
        async { grpc_server.await.map_err(|e| Box::new(e) as Box<dyn std::error::Error>) },
    )?;

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
