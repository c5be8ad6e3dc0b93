//! Scenario 1: a Processing Worker's handshake against a real Main
//! Worker `Registry` service ends with the unwrapped master key sitting
//! only in process memory — never on disk, never on the wire in the
//! clear.

use std::sync::Arc;
use std::time::Duration;

use main_worker::registry::WorkerRegistry;
use main_worker::rpc::RegistryService;
use processing_worker::handshake::{self, HandshakeConfig};
use processing_worker::keycell::KeyCell;
use store_core::crypto;
use store_proto::RegistryServer;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn handshake_confines_key_to_memory() {
    let master_key = crypto::generate_symmetric();
    let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(60)));
    let service = RegistryService {
        registry: registry.clone(),
        master_key: master_key.clone(),
        key_id: "k1".into(),
        session_secret: "test-session-secret".into(),
        worker_ttl: Duration::from_secs(60),
    };

    let addr: std::net::SocketAddr = "127.0.0.1:18743".parse().unwrap();

    let server = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(RegistryServer::new(service))
            .serve(addr)
            .await
            .unwrap();
    });

    // Give the listener a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let key_cell = Arc::new(KeyCell::new());
    let cancel = CancellationToken::new();
    handshake::run(
        HandshakeConfig {
            main_worker_addr: format!("http://{addr}"),
            worker_id: "pw-1".into(),
            tags: [("grpc_addr".to_string(), "http://127.0.0.1:9999".to_string())].into(),
        },
        key_cell.clone(),
        cancel.clone(),
    )
    .await;

    assert!(key_cell.is_subscribed().await);
    let unwrapped = key_cell.key().await.unwrap();
    assert_eq!(unwrapped.as_ref(), master_key.as_ref());

    let record = registry.get("pw-1").unwrap();
    assert_eq!(record.key_id, "k1");

    cancel.cancel();
    server.abort();
}
