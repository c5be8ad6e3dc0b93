//! Generated gRPC client/server types for the `Subscribe` and `Process`
//! RPCs. Both `main-worker` and `processing-worker` depend on this
//! crate so the wire contract has a single source of truth.

pub mod store {
    tonic::include_proto!("store");
}

pub use store::{
    entity_client::EntityClient,
    entity_server::{Entity, EntityServer},
    registry_client::RegistryClient,
    registry_server::{Registry, RegistryServer},
    ProcessRequest, ProcessResponse, SubscribeRequest, SubscribeResponse,
};
