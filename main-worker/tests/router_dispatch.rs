//! Exercises `WorkerRegistry` + `Router` together against a real
//! in-process `Entity` gRPC service, the same path a REST `GET`/`PUT`
//! takes once it reaches the router.

use std::collections::HashMap;
use std::time::Duration;

use main_worker::registry::WorkerRegistry;
use main_worker::router::Router;
use std::sync::Arc;
use store_proto::{Entity, EntityServer, ProcessRequest, ProcessResponse};
use tonic::{Request, Response, Status};

struct EchoEntity;

#[tonic::async_trait]
impl Entity for EchoEntity {
    async fn process(&self, request: Request<ProcessRequest>) -> Result<Response<ProcessResponse>, Status> {
        let req = request.into_inner();
        Ok(Response::new(ProcessResponse {
            status: "OK".to_string(),
            result: req.payload,
            version: "1".to_string(),
            error: String::new(),
        }))
    }
}

#[tokio::test]
async fn dispatch_reaches_the_registered_worker() {
    let addr: std::net::SocketAddr = "127.0.0.1:18744".parse().unwrap();
    let server = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(EntityServer::new(EchoEntity))
            .serve(addr)
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(60)));
    registry.upsert(
        "pw-1",
        "k1",
        "session-tok",
        HashMap::from([("grpc_addr".to_string(), format!("http://{addr}"))]),
    );
    let router = Router::new(registry.clone());

    let response = router
        .dispatch(
            "chatdb_s1",
            ProcessRequest {
                database_name: "chatdb".to_string(),
                entity_key: "s1".to_string(),
                operation: "PUT".to_string(),
                schema_id: String::new(),
                payload: b"hello".to_vec(),
                token: String::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(response.status, "OK");
    assert_eq!(response.result, b"hello");

    server.abort();
}

#[tokio::test]
async fn dispatch_fails_when_no_worker_is_available() {
    let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(60)));
    let router = Router::new(registry);

    let result = router
        .dispatch(
            "chatdb_s1",
            ProcessRequest {
                database_name: "chatdb".to_string(),
                entity_key: "s1".to_string(),
                operation: "GET".to_string(),
                schema_id: String::new(),
                payload: Vec::new(),
                token: String::new(),
            },
        )
        .await;

    assert!(result.is_err());
}
